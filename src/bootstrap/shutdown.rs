use crate::services::{Persistence, WorkerPool};
use anyhow::{Context, Result};

/// Final steps before the process exits.
///
/// Order matters: the pool is stopped and joined before its tables are
/// written, and the tables are written before the connection is closed.
/// Runs at most once; dropping a hook that never ran runs it.
pub struct ShutdownHook {
    workers: Box<dyn WorkerPool>,
    persistence: Box<dyn Persistence>,
    completed: bool,
}

impl ShutdownHook {
    pub fn new(workers: Box<dyn WorkerPool>, persistence: Box<dyn Persistence>) -> Self {
        Self {
            workers,
            persistence,
            completed: false,
        }
    }

    pub fn has_run(&self) -> bool {
        self.completed
    }

    pub(crate) fn workers_mut(&mut self) -> &mut dyn WorkerPool {
        self.workers.as_mut()
    }

    /// Stop the workers, persist the task tables and close persistence.
    ///
    /// Every step is attempted even if an earlier one failed, so a pool that
    /// lost a worker still has its tables saved. The first failure is
    /// returned and later ones are logged. Later calls return `Ok(())`
    /// without doing anything.
    pub fn run(&mut self) -> Result<()> {
        if self.completed {
            return Ok(());
        }
        self.completed = true;

        tracing::info!("Shutting down...");
        let exit = self.workers.exit().context("Failed to stop worker pool");

        let tables = self.workers.task_table();
        let save = self
            .persistence
            .save_tables(&tables)
            .context("Failed to persist task tables");

        let close = self
            .persistence
            .close_connection()
            .context("Failed to close persistence connection");

        let mut first = None;
        for err in [exit, save, close].into_iter().filter_map(Result::err) {
            if first.is_none() {
                first = Some(err);
            } else {
                tracing::error!("{err:#}");
            }
        }

        match first {
            Some(err) => Err(err),
            None => {
                tracing::info!("Shutdown complete");
                Ok(())
            }
        }
    }
}

impl Drop for ShutdownHook {
    fn drop(&mut self) {
        if let Err(err) = self.run() {
            tracing::error!("Shutdown failed: {err:#}");
        }
    }
}
