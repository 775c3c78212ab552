//! Startup scan of the download directory.
//!
//! Downloads land as `<download_dir>/<series>/<chapter>.cbz`. Anything that
//! arrived while the service was down is not yet tracked by the worker pool,
//! so at startup every archive one level below each series directory is
//! compared against the registry and enqueued if missing.

use crate::models::archive_stem;
use crate::services::workers::WorkerPool;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashSet;
use walkdir::WalkDir;

/// Scans a download directory for untracked archives.
#[derive(Debug, Clone)]
pub struct DirectoryReconciler {
    download_dir: Utf8PathBuf,
}

impl DirectoryReconciler {
    pub fn new<P: AsRef<Utf8Path>>(download_dir: P) -> Self {
        Self {
            download_dir: download_dir.as_ref().to_path_buf(),
        }
    }

    /// Archives currently on disk, as `(task id, path)` pairs, in directory
    /// order.
    pub fn snapshot(&self) -> impl Iterator<Item = Result<(String, Utf8PathBuf)>> + use<> {
        WalkDir::new(&self.download_dir)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        return Some(Err(err).context("Failed to read download directory"));
                    }
                };
                if !entry.file_type().is_file() {
                    return None;
                }
                let path = match Utf8PathBuf::try_from(entry.into_path()) {
                    Ok(path) => path,
                    Err(err) => {
                        tracing::warn!("Skipping non UTF-8 path {:?}", err.as_path());
                        return None;
                    }
                };
                let id = archive_stem(&path)?.to_string();
                Some(Ok((id, path)))
            })
    }

    /// Enqueue every archive whose id is not in `existing`.
    ///
    /// The returned iterator is lazy: nothing is scanned or enqueued until it
    /// is driven, and it cannot be restarted. Each item is the id of a newly
    /// enqueued task, or the error that stopped that entry.
    pub fn reconcile<'a>(
        &self,
        mut existing: HashSet<String>,
        pool: &'a mut dyn WorkerPool,
    ) -> impl Iterator<Item = Result<String>> + use<'a> {
        self.snapshot().filter_map(move |entry| {
            let (id, path) = match entry {
                Ok(found) => found,
                Err(err) => return Some(Err(err)),
            };
            if !existing.insert(id.clone()) {
                return None;
            }

            tracing::info!("Found untracked download {}; adding to queue", path);
            Some(pool.add_to_task_queue(&path).map(|()| id))
        })
    }
}
