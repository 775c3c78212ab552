//! Moves processed downloads into the library.
//!
//! `<download_dir>/<series>/<chapter>.cbz` ends up at
//! `<library>/<series>/<chapter>.cbz`. Network shares don't support atomic
//! renames across mounts, so for those the archive is copied and the
//! original removed.

use crate::models::{WorkerSettings, archive_stem};
use crate::services::workers::TaskProcessor;
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

#[derive(Debug, Default, Clone, Copy)]
pub struct LibraryMover;

impl LibraryMover {
    pub fn new() -> Self {
        Self
    }

    /// Library location for a downloaded archive.
    pub fn destination(path: &Utf8Path, settings: &WorkerSettings) -> Result<Utf8PathBuf> {
        if archive_stem(path).is_none() {
            bail!("{path} is not a .cbz archive");
        }
        let file_name = path.file_name().context("Archive has no file name")?;
        let series = path
            .parent()
            .and_then(Utf8Path::file_name)
            .with_context(|| format!("{path} is not inside a series directory"))?;

        Ok(settings.library.dir.join(series).join(file_name))
    }
}

impl TaskProcessor for LibraryMover {
    fn process(&self, path: &Utf8Path, settings: &WorkerSettings) -> Result<()> {
        let destination = Self::destination(path, settings)?;

        if let Some(mode) = settings.mode {
            if !mode.rename_file {
                tracing::info!("Dry run: would move {path} to {destination}");
                return Ok(());
            }
            if !mode.write_comicinfo {
                tracing::debug!("Dry run: ComicInfo.xml left untouched for {path}");
            }
        }

        if destination.exists() {
            bail!("{destination} already exists in the library");
        }
        let series_dir = destination
            .parent()
            .context("Library destination has no parent")?;
        fs::create_dir_all(series_dir)
            .with_context(|| format!("Failed to create series directory {series_dir}"))?;

        if settings.library.is_network_path {
            fs::copy(path, &destination)
                .with_context(|| format!("Failed to copy {path} to {destination}"))?;
            fs::remove_file(path).with_context(|| format!("Failed to remove {path}"))?;
        } else {
            fs::rename(path, &destination)
                .with_context(|| format!("Failed to move {path} to {destination}"))?;
        }

        tracing::info!("Moved {path} to {destination}");
        Ok(())
    }
}
