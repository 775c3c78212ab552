use crate::metrics::Metrics;
use crate::models::{TaskStatus, TaskTable, WorkerSettings, archive_stem};
use crate::state::TaskRegistry;
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SendError, Sender, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

/// The worker pool as seen by bootstrap, reconciliation and shutdown.
#[cfg_attr(test, mockall::automock)]
pub trait WorkerPool: Send {
    /// Start the worker threads.
    fn initialize(&mut self, settings: &WorkerSettings) -> Result<()>;

    /// Adopt persisted task tables and queue every resumable task.
    fn load_task_queue(&mut self, tables: TaskTable) -> Result<()>;

    /// Track and queue an archive. Already-tracked archives are ignored.
    /// Blocks while a bounded queue is full.
    fn add_to_task_queue(&mut self, path: &Utf8Path) -> Result<()>;

    /// Ids of every tracked task.
    fn task_ids(&self) -> HashSet<String>;

    /// Copy of the task-tracking table, for persistence.
    fn task_table(&self) -> TaskTable;

    /// Stop accepting work and block until every worker thread has exited.
    fn exit(&mut self) -> Result<()>;
}

/// Does the actual work for one archive.
#[cfg_attr(test, mockall::automock)]
pub trait TaskProcessor: Send + Sync {
    fn process(&self, path: &Utf8Path, settings: &WorkerSettings) -> Result<()>;
}

struct Task {
    id: String,
    path: Utf8PathBuf,
}

enum TaskSender {
    Bounded(SyncSender<Task>),
    Unbounded(Sender<Task>),
}

impl TaskSender {
    fn send(&self, task: Task) -> Result<(), SendError<Task>> {
        match self {
            Self::Bounded(sender) => sender.send(task),
            Self::Unbounded(sender) => sender.send(task),
        }
    }
}

/// Shared by every worker thread.
struct WorkerContext {
    processor: Arc<dyn TaskProcessor>,
    registry: TaskRegistry,
    metrics: Arc<Metrics>,
    settings: Arc<WorkerSettings>,
    stopping: Arc<AtomicBool>,
}

impl WorkerContext {
    fn run(&self, task: Task) {
        if self.settings.debug_mode {
            tracing::debug!("Debug mode: leaving {} unprocessed", task.path);
            self.metrics.record_skipped();
            return;
        }

        self.registry.set_status(&task.id, TaskStatus::Running);
        let start = Instant::now();

        // A panicking processor fails its task; the worker keeps serving the queue
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.processor.process(&task.path, &self.settings)
        }))
        .unwrap_or_else(|payload| {
            Err(anyhow::anyhow!(
                "processor panicked: {}",
                panic_message(payload.as_ref())
            ))
        });

        match outcome {
            Ok(()) => {
                self.registry.complete(&task.id);
                self.metrics.record_processed(start.elapsed());
                tracing::info!("Processed {}", task.path);
            }
            Err(err) => {
                self.registry.set_status(&task.id, TaskStatus::Failed);
                self.metrics.record_failed();
                tracing::error!("Failed to process {}: {err:#}", task.path);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

fn worker_loop(receiver: Arc<Mutex<Receiver<Task>>>, context: Arc<WorkerContext>) {
    loop {
        let task = {
            let receiver = receiver.lock().unwrap_or_else(PoisonError::into_inner);
            receiver.recv()
        };

        // Sender dropped and queue drained
        let Ok(task) = task else { break };

        // Queued tasks stay pending so they are persisted and resumed
        if context.stopping.load(Ordering::Acquire) {
            continue;
        }

        context.run(task);
    }
}

/// Thread pool that processes queued archives.
///
/// `threads` named OS threads pull from one shared channel. The channel is
/// bounded to `max_queue_size` entries, or unbounded when that is 0.
pub struct QueueWorker {
    processor: Arc<dyn TaskProcessor>,
    registry: TaskRegistry,
    metrics: Arc<Metrics>,
    sender: Option<TaskSender>,
    stopping: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl QueueWorker {
    pub fn new(processor: Arc<dyn TaskProcessor>) -> Self {
        Self {
            processor,
            registry: TaskRegistry::new(),
            metrics: Arc::new(Metrics::new()),
            sender: None,
            stopping: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn is_running(&self) -> bool {
        self.sender.is_some()
    }

    fn send(&self, id: String, path: Utf8PathBuf) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .context("Worker pool is not running")?;
        sender
            .send(Task { id, path })
            .map_err(|_| anyhow::anyhow!("Worker threads have stopped"))?;
        self.metrics.record_enqueued();
        Ok(())
    }
}

impl WorkerPool for QueueWorker {
    fn initialize(&mut self, settings: &WorkerSettings) -> Result<()> {
        if self.is_running() {
            bail!("Worker pool is already running");
        }

        let (sender, receiver) = if settings.max_queue_size > 0 {
            let (tx, rx) = mpsc::sync_channel(settings.max_queue_size);
            (TaskSender::Bounded(tx), rx)
        } else {
            let (tx, rx) = mpsc::channel();
            (TaskSender::Unbounded(tx), rx)
        };

        let receiver = Arc::new(Mutex::new(receiver));
        let context = Arc::new(WorkerContext {
            processor: Arc::clone(&self.processor),
            registry: self.registry.clone(),
            metrics: Arc::clone(&self.metrics),
            settings: Arc::new(settings.clone()),
            stopping: Arc::clone(&self.stopping),
        });

        let threads = settings.threads.max(1);
        for n in 0..threads {
            let receiver = Arc::clone(&receiver);
            let context = Arc::clone(&context);
            let handle = std::thread::Builder::new()
                .name(format!("queue-worker-{n}"))
                .spawn(move || worker_loop(receiver, context))
                .context("Failed to spawn worker thread")?;
            self.handles.push(handle);
        }

        self.stopping.store(false, Ordering::Release);
        self.sender = Some(sender);

        tracing::info!(
            "Worker pool started: threads={}, max_queue_size={}, debug_mode={}",
            threads,
            settings.max_queue_size,
            settings.debug_mode
        );
        Ok(())
    }

    fn load_task_queue(&mut self, tables: TaskTable) -> Result<()> {
        if !self.is_running() {
            bail!("Worker pool must be initialized before loading the task queue");
        }

        self.registry.load(tables.clone());

        let mut resumed = 0;
        for (id, record) in tables {
            if !record.status.is_resumable() {
                continue;
            }
            if !record.path.exists() {
                tracing::info!("Dropping task {id}; {} no longer exists", record.path);
                self.registry.complete(&id);
                continue;
            }
            self.registry.set_status(&id, TaskStatus::Pending);
            self.send(id, record.path)?;
            resumed += 1;
        }

        tracing::info!(
            "Task queue loaded: {} tracked, {} resumed",
            self.registry.len(),
            resumed
        );
        Ok(())
    }

    fn add_to_task_queue(&mut self, path: &Utf8Path) -> Result<()> {
        if !self.is_running() {
            bail!("Worker pool is not running");
        }

        let id = archive_stem(path)
            .with_context(|| format!("{path} is not a .cbz archive"))?
            .to_string();

        if !self.registry.insert_pending(&id, path.to_path_buf()) {
            tracing::debug!("{id} is already tracked");
            return Ok(());
        }

        self.send(id, path.to_path_buf())
    }

    fn task_ids(&self) -> HashSet<String> {
        self.registry.ids()
    }

    fn task_table(&self) -> TaskTable {
        self.registry.snapshot()
    }

    fn exit(&mut self) -> Result<()> {
        if self.sender.is_none() && self.handles.is_empty() {
            return Ok(());
        }

        tracing::info!("Stopping worker threads...");
        self.stopping.store(true, Ordering::Release);
        self.sender = None;

        let mut panicked = 0;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                panicked += 1;
            }
        }

        self.metrics.log_summary();

        if panicked > 0 {
            bail!("{panicked} worker thread(s) panicked");
        }
        tracing::info!("Worker threads stopped");
        Ok(())
    }
}

impl Drop for QueueWorker {
    fn drop(&mut self) {
        if let Err(err) = self.exit() {
            tracing::error!("Worker pool did not stop cleanly: {err:#}");
        }
    }
}
