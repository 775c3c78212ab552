//! Startup sequence.
//!
//! [`bootstrap`] walks the stages below strictly in order. Configuration
//! problems come back as [`BootstrapError::Fatal`], collaborator failures as
//! [`BootstrapError::Collaborator`]; neither is retried. Once logging is up,
//! every failure is logged before logging is torn down. On success the
//! returned [`Application`] owns the single [`ShutdownHook`].
//!
//! 1. logging (level, log directory, sink ports)
//! 2. resolve the rest of the document against the environment: timezone,
//!    dry-run mode, thread count, queue size, debug mode, download, image and
//!    library directories
//! 3. persistence configure, connect and verify
//! 4. create the download, image and library directories
//! 5. load task tables, start workers, reload the task queue
//! 6. reconcile the download directory
//! 7. metadata API
//! 8. shutdown hook

pub mod shutdown;

pub use shutdown::ShutdownHook;

use crate::config::env::{EnvOverrides, EnvSource};
use crate::config::resolve::resolve_logging;
use crate::error::{BootstrapError, ConfigError, Stage};
use crate::logging::{LoggingGuard, setup_logging};
use crate::models::{EffectiveSettings, LoggingSettings, Settings};
use crate::services::{DirectoryReconciler, MetadataApi, Persistence, WorkerPool};
use camino::Utf8Path;
use std::fs;
use std::sync::Arc;

/// The external pieces bootstrap wires together.
pub struct Collaborators {
    pub persistence: Box<dyn Persistence>,
    pub workers: Box<dyn WorkerPool>,
    pub metadata: Box<dyn MetadataApi>,
}

/// A fully started service.
///
/// Dropping it runs shutdown if [`Application::shutdown`] was never called,
/// and only then tears down logging.
pub struct Application {
    shutdown: ShutdownHook,
    settings: Arc<EffectiveSettings>,
    metadata: Box<dyn MetadataApi>,
    _logging: LoggingGuard,
}

impl Application {
    pub fn settings(&self) -> &Arc<EffectiveSettings> {
        &self.settings
    }

    pub fn metadata(&mut self) -> &mut dyn MetadataApi {
        self.metadata.as_mut()
    }

    /// Run the shutdown sequence now. Calling it again is a no-op.
    pub fn shutdown(&mut self) -> anyhow::Result<()> {
        self.shutdown.run()
    }
}

struct Started {
    shutdown: ShutdownHook,
    settings: Arc<EffectiveSettings>,
    metadata: Box<dyn MetadataApi>,
}

/// Run every startup stage against `document` and the environment in `env`.
pub fn bootstrap(
    document: &Settings,
    env: &dyn EnvSource,
    collaborators: Collaborators,
) -> Result<Application, BootstrapError> {
    let overrides = EnvOverrides::new(env);

    let logging = resolve_logging(&document.logger, overrides)?;
    let logging_guard =
        setup_logging(&logging).map_err(BootstrapError::collaborator(Stage::Logging))?;

    // The guard must outlive this log line so file and network sinks get it
    match start(document, overrides, logging, collaborators) {
        Ok(started) => {
            tracing::debug!("Bootstrap complete");
            Ok(Application {
                shutdown: started.shutdown,
                settings: started.settings,
                metadata: started.metadata,
                _logging: logging_guard,
            })
        }
        Err(err) => {
            tracing::error!("Manga Tagger cannot start: {err}");
            Err(err)
        }
    }
}

fn start(
    document: &Settings,
    overrides: EnvOverrides<'_>,
    logging: LoggingSettings,
    collaborators: Collaborators,
) -> Result<Started, BootstrapError> {
    let Collaborators {
        mut persistence,
        mut workers,
        mut metadata,
    } = collaborators;

    tracing::debug!("Logging level: {}", logging.level);
    for row in overrides.active() {
        tracing::debug!("{} overridden by {}", row.key, row.var);
    }

    let settings = Arc::new(EffectiveSettings::resolve_with_logging(
        logging, document, overrides,
    )?);
    log_settings(&settings);

    // Persistence
    persistence.configure(settings.database.clone());
    persistence
        .initialize()
        .map_err(BootstrapError::collaborator(Stage::PersistenceConnect))?;
    persistence.print_debug_settings();

    if let Err(err) = prepare_directories(&settings) {
        close_quietly(persistence.as_mut());
        return Err(err.into());
    }

    // Task tables and workers
    let tables = match persistence.load_tables() {
        Ok(tables) => tables,
        Err(err) => {
            close_quietly(persistence.as_mut());
            return Err(BootstrapError::collaborator(Stage::LoadTaskTables)(err));
        }
    };
    if let Err(err) = workers.initialize(&settings.workers) {
        close_quietly(persistence.as_mut());
        return Err(BootstrapError::collaborator(Stage::StartWorkers)(err));
    }

    // From here on a failure must stop the pool and persist what it holds
    let mut shutdown_hook = ShutdownHook::new(workers, persistence);
    let started = (|| {
        shutdown_hook
            .workers_mut()
            .load_task_queue(tables)
            .map_err(BootstrapError::collaborator(Stage::StartWorkers))?;

        reconcile_downloads(&settings.workers.download_dir, shutdown_hook.workers_mut());

        metadata
            .initialize()
            .map_err(BootstrapError::collaborator(Stage::MetadataApi))
    })();

    if let Err(err) = started {
        if let Err(shutdown_err) = shutdown_hook.run() {
            tracing::error!("Shutdown after failed startup also failed: {shutdown_err:#}");
        }
        return Err(err);
    }

    Ok(Started {
        shutdown: shutdown_hook,
        settings,
        metadata,
    })
}

fn log_settings(settings: &EffectiveSettings) {
    let workers = &settings.workers;
    tracing::debug!("Timezone: {}", settings.timezone);
    match &settings.mode {
        Some(mode) => tracing::info!("Dry run mode is active: {mode:?}"),
        None => tracing::debug!("Dry run mode is off"),
    }
    tracing::debug!("Threads: {}", workers.threads);
    tracing::debug!("Max queue size: {}", workers.max_queue_size);
    if workers.debug_mode {
        tracing::warn!("Debug mode is on; queued files will not be processed");
    }
}

/// The download and library directories must exist before workers start;
/// the image directory is best effort.
fn prepare_directories(settings: &EffectiveSettings) -> Result<(), ConfigError> {
    create_dir(&settings.workers.download_dir, "Download")?;
    tracing::debug!("Download directory: {}", settings.workers.download_dir);

    match &settings.image_dir {
        Some(dir) => {
            if let Err(err) = create_dir(dir, "Image") {
                tracing::warn!("{err}; continuing without it");
            }
            tracing::debug!("Image directory: {dir}");
        }
        None => tracing::debug!("Image directory not configured"),
    }

    create_dir(&settings.library.dir, "Library")?;
    tracing::debug!("Library directory: {}", settings.library.dir);
    Ok(())
}

/// Enqueue downloads that arrived while the service was down. Problems are
/// logged; reconciliation never stops startup.
fn reconcile_downloads(download_dir: &Utf8Path, workers: &mut dyn WorkerPool) {
    let existing = workers.task_ids();
    let reconciler = DirectoryReconciler::new(download_dir);

    let mut enqueued = 0usize;
    for result in reconciler.reconcile(existing, workers) {
        match result {
            Ok(_) => enqueued += 1,
            Err(err) => tracing::warn!("{}: {err:#}", Stage::Reconcile),
        }
    }

    tracing::info!("Reconciled download directory: {enqueued} new task(s)");
}

fn create_dir(path: &Utf8Path, label: &str) -> Result<(), ConfigError> {
    if path.exists() {
        return Ok(());
    }
    tracing::info!("{label} directory \"{path}\" does not exist; creating now");
    fs::create_dir_all(path).map_err(|source| ConfigError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

fn close_quietly(persistence: &mut dyn Persistence) {
    if let Err(err) = persistence.close_connection() {
        tracing::warn!("Failed to close persistence after failed startup: {err:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env;
    use crate::models::TaskTable;
    use crate::services::metadata::MockMetadataApi;
    use crate::services::persistence::MockPersistence;
    use crate::services::workers::MockWorkerPool;
    use camino::Utf8PathBuf;
    use mockall::Sequence;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        root: Utf8PathBuf,
        document: Settings,
    }

    fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();

        let mut document = Settings::default();
        document.logger.log_dir = root.join("logs").to_string();
        document.logger.file.enabled = false;
        document.logger.json.enabled = false;
        document.application.image_dir = Some(root.join("images").to_string());
        document.application.library.dir = Some(root.join("library").to_string());
        document.application.library.download_dir = root.join("downloads").to_string();
        document.database.data_dir = root.join("data").to_string();

        Fixture {
            _temp_dir: temp_dir,
            root,
            document,
        }
    }

    fn no_env() -> HashMap<&'static str, &'static str> {
        HashMap::new()
    }

    fn happy_persistence(seq: &mut Sequence) -> MockPersistence {
        let mut persistence = MockPersistence::new();
        persistence
            .expect_configure()
            .times(1)
            .in_sequence(seq)
            .return_const(());
        persistence
            .expect_initialize()
            .times(1)
            .in_sequence(seq)
            .returning(|| Ok(()));
        persistence
            .expect_print_debug_settings()
            .times(1)
            .in_sequence(seq)
            .return_const(());
        persistence
            .expect_load_tables()
            .times(1)
            .in_sequence(seq)
            .returning(|| Ok(TaskTable::new()));
        persistence
    }

    fn expect_shutdown(workers: &mut MockWorkerPool, persistence: &mut MockPersistence) {
        workers.expect_exit().times(1).returning(|| Ok(()));
        workers.expect_task_table().times(1).returning(TaskTable::new);
        persistence.expect_save_tables().times(1).returning(|_| Ok(()));
        persistence.expect_close_connection().times(1).returning(|| Ok(()));
    }

    #[test]
    fn test_stages_run_in_order() {
        let f = fixture();
        std::fs::create_dir_all(f.root.join("downloads/Naruto")).unwrap();
        std::fs::write(f.root.join("downloads/Naruto/Naruto 001.cbz"), b"PK").unwrap();

        let mut seq = Sequence::new();
        let mut persistence = happy_persistence(&mut seq);
        let mut workers = MockWorkerPool::new();
        let mut metadata = MockMetadataApi::new();

        workers
            .expect_initialize()
            .withf(|settings| settings.threads == 8 && settings.max_queue_size == 0)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        workers
            .expect_load_task_queue()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        workers
            .expect_task_ids()
            .times(1)
            .in_sequence(&mut seq)
            .returning(Default::default);
        workers
            .expect_add_to_task_queue()
            .withf(|path| path.as_str().ends_with("Naruto 001.cbz"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        metadata
            .expect_initialize()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        expect_shutdown(&mut workers, &mut persistence);

        let mut app = bootstrap(
            &f.document,
            &no_env(),
            Collaborators {
                persistence: Box::new(persistence),
                workers: Box::new(workers),
                metadata: Box::new(metadata),
            },
        )
        .unwrap();

        assert!(f.root.join("downloads").is_dir());
        assert!(f.root.join("images").is_dir());
        assert!(f.root.join("library").is_dir());
        assert!(f.root.join("logs").is_dir());
        assert_eq!(app.settings().library.dir, f.root.join("library"));

        app.shutdown().unwrap();
    }

    #[test]
    fn test_missing_library_dir_stops_before_workers() {
        let mut f = fixture();
        f.document.application.library.dir = None;

        // Resolution fails before anything is connected
        let mut persistence = MockPersistence::new();
        persistence.expect_configure().never();
        persistence.expect_initialize().never();
        persistence.expect_close_connection().never();

        let mut workers = MockWorkerPool::new();
        workers.expect_initialize().never();
        let mut metadata = MockMetadataApi::new();
        metadata.expect_initialize().never();

        let err = bootstrap(
            &f.document,
            &no_env(),
            Collaborators {
                persistence: Box::new(persistence),
                workers: Box::new(workers),
                metadata: Box::new(metadata),
            },
        )
        .err()
        .unwrap();

        assert!(matches!(
            err,
            BootstrapError::Fatal(ConfigError::MissingLibraryDir)
        ));
    }

    #[test]
    fn test_invalid_logging_level_is_fatal_before_persistence() {
        let f = fixture();
        let vars = HashMap::from([(env::LOGGING_LEVEL, "verbose")]);

        let mut persistence = MockPersistence::new();
        persistence.expect_configure().never();
        persistence.expect_initialize().never();

        let err = bootstrap(
            &f.document,
            &vars,
            Collaborators {
                persistence: Box::new(persistence),
                workers: Box::new(MockWorkerPool::new()),
                metadata: Box::new(MockMetadataApi::new()),
            },
        )
        .err()
        .unwrap();

        assert!(err.is_fatal_configuration());
        assert!(matches!(
            err,
            BootstrapError::Fatal(ConfigError::InvalidLoggingLevel(_))
        ));
    }

    #[test]
    fn test_relative_download_dir_is_fatal() {
        let mut f = fixture();
        f.document.application.library.download_dir = "downloads".to_string();

        let mut persistence = MockPersistence::new();
        persistence.expect_configure().never();
        persistence.expect_initialize().never();

        let mut workers = MockWorkerPool::new();
        workers.expect_initialize().never();

        let err = bootstrap(
            &f.document,
            &no_env(),
            Collaborators {
                persistence: Box::new(persistence),
                workers: Box::new(workers),
                metadata: Box::new(MockMetadataApi::new()),
            },
        )
        .err()
        .unwrap();

        assert!(matches!(
            err,
            BootstrapError::Fatal(ConfigError::RelativeDownloadDir(_))
        ));
    }

    #[test]
    fn test_library_dir_creation_failure_closes_persistence() {
        let mut f = fixture();
        std::fs::write(f.root.join("blocker"), b"").unwrap();
        f.document.application.library.dir = Some(f.root.join("blocker/library").to_string());

        let mut persistence = MockPersistence::new();
        persistence.expect_configure().times(1).return_const(());
        persistence.expect_initialize().times(1).returning(|| Ok(()));
        persistence.expect_print_debug_settings().return_const(());
        persistence.expect_load_tables().never();
        persistence
            .expect_close_connection()
            .times(1)
            .returning(|| Ok(()));

        let mut workers = MockWorkerPool::new();
        workers.expect_initialize().never();

        let err = bootstrap(
            &f.document,
            &no_env(),
            Collaborators {
                persistence: Box::new(persistence),
                workers: Box::new(workers),
                metadata: Box::new(MockMetadataApi::new()),
            },
        )
        .err()
        .unwrap();

        assert!(matches!(
            err,
            BootstrapError::Fatal(ConfigError::CreateDir { .. })
        ));
    }

    #[test]
    fn test_image_dir_creation_failure_is_not_fatal() {
        let mut f = fixture();
        std::fs::write(f.root.join("blocker"), b"").unwrap();
        f.document.application.image_dir = Some(f.root.join("blocker/images").to_string());

        let mut seq = Sequence::new();
        let mut persistence = happy_persistence(&mut seq);
        let mut workers = MockWorkerPool::new();
        workers.expect_initialize().times(1).returning(|_| Ok(()));
        workers.expect_load_task_queue().returning(|_| Ok(()));
        workers.expect_task_ids().returning(Default::default);
        let mut metadata = MockMetadataApi::new();
        metadata.expect_initialize().returning(|| Ok(()));
        expect_shutdown(&mut workers, &mut persistence);

        let mut app = bootstrap(
            &f.document,
            &no_env(),
            Collaborators {
                persistence: Box::new(persistence),
                workers: Box::new(workers),
                metadata: Box::new(metadata),
            },
        )
        .unwrap();

        assert!(!f.root.join("blocker/images").exists());
        app.shutdown().unwrap();
    }

    #[test]
    fn test_persistence_failure_names_stage() {
        let f = fixture();

        let mut persistence = MockPersistence::new();
        persistence.expect_configure().return_const(());
        persistence
            .expect_initialize()
            .returning(|| Err(anyhow::anyhow!("connection refused")));
        persistence.expect_load_tables().never();

        let err = bootstrap(
            &f.document,
            &no_env(),
            Collaborators {
                persistence: Box::new(persistence),
                workers: Box::new(MockWorkerPool::new()),
                metadata: Box::new(MockMetadataApi::new()),
            },
        )
        .err()
        .unwrap();

        assert!(matches!(
            err,
            BootstrapError::Collaborator {
                stage: Stage::PersistenceConnect,
                ..
            }
        ));
    }

    #[test]
    fn test_metadata_failure_shuts_down_started_pool() {
        let f = fixture();

        let mut seq = Sequence::new();
        let mut persistence = happy_persistence(&mut seq);
        let mut workers = MockWorkerPool::new();
        workers.expect_initialize().returning(|_| Ok(()));
        workers.expect_load_task_queue().returning(|_| Ok(()));
        workers.expect_task_ids().returning(Default::default);
        expect_shutdown(&mut workers, &mut persistence);

        let mut metadata = MockMetadataApi::new();
        metadata
            .expect_initialize()
            .returning(|| Err(anyhow::anyhow!("endpoint unreachable")));

        let err = bootstrap(
            &f.document,
            &no_env(),
            Collaborators {
                persistence: Box::new(persistence),
                workers: Box::new(workers),
                metadata: Box::new(metadata),
            },
        )
        .err()
        .unwrap();

        assert!(matches!(
            err,
            BootstrapError::Collaborator {
                stage: Stage::MetadataApi,
                ..
            }
        ));
    }

    #[test]
    fn test_overrides_reach_worker_settings() {
        let f = fixture();
        let vars = HashMap::from([
            (env::THREADS, "3"),
            (env::MAX_QUEUE_SIZE, "-5"),
            (env::DEBUG_MODE, "TRUE"),
        ]);

        let mut seq = Sequence::new();
        let mut persistence = happy_persistence(&mut seq);
        let mut workers = MockWorkerPool::new();
        workers
            .expect_initialize()
            .withf(|settings| {
                settings.threads == 3 && settings.max_queue_size == 0 && settings.debug_mode
            })
            .times(1)
            .returning(|_| Ok(()));
        workers.expect_load_task_queue().returning(|_| Ok(()));
        workers.expect_task_ids().returning(Default::default);
        let mut metadata = MockMetadataApi::new();
        metadata.expect_initialize().returning(|| Ok(()));
        expect_shutdown(&mut workers, &mut persistence);

        let app = bootstrap(
            &f.document,
            &vars,
            Collaborators {
                persistence: Box::new(persistence),
                workers: Box::new(workers),
                metadata: Box::new(metadata),
            },
        )
        .unwrap();

        assert!(app.settings().workers.debug_mode);
        drop(app);
    }
}
