//! Data models for the service.
//!
//! - [`Settings`]: the on-disk configuration document, loaded by
//!   [`ConfigStore`](crate::config::ConfigStore)
//! - [`EffectiveSettings`]: resolved values after environment overrides,
//!   produced once during bootstrap
//! - [`TaskRecord`] / [`TaskTable`]: tracked archive tasks shared between the
//!   worker pool and the persistence layer

pub mod config;
pub mod settings;
pub mod task;

pub use config::{LogFormat, LogRotation, Settings};
pub use settings::{
    DatabaseSettings, EffectiveSettings, LibrarySettings, LogLevel, LoggingSettings,
    ModeSettings, NetworkSinkSettings, SinkSettings, WorkerSettings,
};
pub use task::{ARCHIVE_EXTENSION, TaskRecord, TaskStatus, TaskTable, archive_stem};
