// Manga Tagger - watches a download directory and files finished chapters
// into a manga library
//
// This is the library crate containing the startup sequence, configuration and
// services. The binary crate (main.rs) runs it until the process is told to stop.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use bootstrap::{Application, Collaborators, ShutdownHook, bootstrap};
pub use config::{ConfigStore, EnvOverrides, EnvSource, ProcessEnv};
pub use error::{BootstrapError, ConfigError, Stage};
pub use models::{EffectiveSettings, ModeSettings, Settings};
pub use state::{TaskChange, TaskRegistry};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
