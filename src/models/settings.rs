use crate::models::config::{LogFormat, LogRotation};
use camino::Utf8PathBuf;
use std::fmt;

/// Values actually applied to subsystems, after environment overrides.
///
/// Produced once by bootstrap and shared read-only (behind an `Arc`) for the
/// rest of the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveSettings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub timezone: String,
    /// `None` means normal processing.
    pub mode: Option<ModeSettings>,
    pub workers: WorkerSettings,
    pub image_dir: Option<Utf8PathBuf>,
    pub library: LibrarySettings,
}

/// Closed set of accepted logging levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Debug,
}

impl LogLevel {
    /// Case-insensitive parse; anything other than `info`/`debug` is rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: LogLevel,
    pub log_dir: Utf8PathBuf,
    pub rotation: LogRotation,
    pub backup_count: usize,
    pub console: SinkSettings,
    pub file: SinkSettings,
    pub json: SinkSettings,
    pub tcp: NetworkSinkSettings,
    pub json_tcp: NetworkSinkSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkSettings {
    pub enabled: bool,
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSinkSettings {
    pub enabled: bool,
    pub format: LogFormat,
    pub host: String,
    pub port: u16,
}

/// Connection parameters handed to the persistence layer.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub database_name: String,
    pub host_address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub auth_source: String,
    pub server_selection_timeout_ms: u64,
    pub data_dir: Utf8PathBuf,
}

// Keeps the password out of logs and panic messages.
impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("database_name", &self.database_name)
            .field("host_address", &self.host_address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"********")
            .field("auth_source", &self.auth_source)
            .field(
                "server_selection_timeout_ms",
                &self.server_selection_timeout_ms,
            )
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

/// Dry-run flags. Each flag says whether that side effect is still allowed
/// while dry-run mode is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeSettings {
    pub database_insert: bool,
    pub rename_file: bool,
    pub write_comicinfo: bool,
}

/// Everything the worker pool needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    pub download_dir: Utf8PathBuf,
    /// Always at least 1.
    pub threads: usize,
    /// 0 means unbounded.
    pub max_queue_size: usize,
    /// When set, tasks are tracked but never processed.
    pub debug_mode: bool,
    pub mode: Option<ModeSettings>,
    pub library: LibrarySettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySettings {
    pub dir: Utf8PathBuf,
    pub is_network_path: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parse_is_case_insensitive() {
        assert_eq!(LogLevel::parse("INFO"), Some(LogLevel::Info));
        assert_eq!(LogLevel::parse("Debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("warning"), None);
        assert_eq!(LogLevel::parse(""), None);
    }

    #[test]
    fn test_database_settings_debug_masks_password() {
        let settings = DatabaseSettings {
            database_name: "manga_tagger".to_string(),
            host_address: "localhost".to_string(),
            port: 27017,
            username: "user".to_string(),
            password: "hunter2".to_string(),
            auth_source: "admin".to_string(),
            server_selection_timeout_ms: 1,
            data_dir: Utf8PathBuf::from("data"),
        };

        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("********"));
    }
}
