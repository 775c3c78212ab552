//! Manga Tagger service entry point.
//!
//! # Execution Flow
//!
//! 1. Load `settings.yaml` from the working directory, writing defaults on
//!    first run
//! 2. Bootstrap: logging, persistence, directories, workers, reconciliation,
//!    metadata API
//! 3. Wait for Ctrl-C (or SIGTERM on Unix)
//! 4. Shutdown: stop workers, persist task tables, close persistence
//!
//! Any bootstrap failure exits with a non-zero status before the service
//! starts waiting.

use anyhow::{Context, Result};
use manga_tagger::services::{AniList, FileStore, LibraryMover, QueueWorker};
use manga_tagger::{APP_NAME, Collaborators, ConfigStore, ProcessEnv, VERSION, bootstrap};
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Bootstrap already logged it; logging may never have come up
            eprintln!("{APP_NAME}: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let store = ConfigStore::in_working_dir()?;
    let document = store.load()?;

    let collaborators = Collaborators {
        persistence: Box::new(FileStore::new()),
        workers: Box::new(QueueWorker::new(Arc::new(LibraryMover::new()))),
        metadata: Box::new(AniList::new()),
    };
    let mut app = bootstrap(&document, &ProcessEnv, collaborators)?;

    tracing::info!("{} v{} is running", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .thread_name("manga-tagger-signals")
        .build()
        .context("Failed to build signal runtime")?;
    runtime.block_on(wait_for_termination())?;

    tracing::info!("Termination requested");
    app.shutdown()
}

#[cfg(unix)]
async fn wait_for_termination() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C"),
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")
}
