use serde::{Deserialize, Deserializer, Serialize};

/// The on-disk configuration document (`settings.yaml`).
///
/// Every key is required when the document is parsed. Nullable keys such as
/// `application.image_dir` must still be present, holding `null` when unused.
/// [`Settings::default`] is the only place defaults come from: it builds the
/// whole document at once, which is written out on first run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub application: ApplicationSection,
    pub database: DatabaseSection,
    pub logger: LoggerSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicationSection {
    pub debug_mode: bool,
    pub timezone: String,
    #[serde(deserialize_with = "present_or_null")]
    pub image_dir: Option<String>,
    pub library: LibrarySection,
    pub dry_run: DryRunSection,
    pub multithreading: MultithreadingSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibrarySection {
    #[serde(deserialize_with = "present_or_null")]
    pub dir: Option<String>,
    pub is_network_path: bool,
    pub download_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DryRunSection {
    pub enabled: bool,
    pub rename_file: bool,
    pub database_insert: bool,
    pub write_comicinfo: bool,
}

/// Raw thread and queue values; signed so that out-of-range entries survive
/// parsing and get clamped during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MultithreadingSection {
    pub threads: i64,
    pub max_queue_size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSection {
    pub database_name: String,
    pub host_address: String,
    pub port: i64,
    pub username: String,
    pub password: String,
    pub auth_source: String,
    pub server_selection_timeout_ms: i64,
    pub data_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggerSection {
    /// Kept as a string so an unexpected level is reported by validation
    /// rather than as a parse failure.
    pub logging_level: String,
    pub log_dir: String,
    pub rotation: LogRotation,
    pub backup_count: usize,
    pub console: SinkSection,
    pub file: SinkSection,
    pub json: SinkSection,
    pub tcp: NetworkSinkSection,
    pub json_tcp: NetworkSinkSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SinkSection {
    pub enabled: bool,
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkSinkSection {
    pub enabled: bool,
    pub format: LogFormat,
    pub host: String,
    pub port: u16,
}

/// Output format of a single log sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Full,
    Compact,
    Pretty,
    Json,
}

/// How often file sinks roll over to a new file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    Daily,
    Never,
}

/// Deserializes an `Option` without serde's implicit "missing means None",
/// so an absent key is still reported as a missing field.
fn present_or_null<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)
}

impl Default for ApplicationSection {
    fn default() -> Self {
        Self {
            debug_mode: false,
            timezone: "America/New_York".to_string(),
            image_dir: Some("/manga/images".to_string()),
            library: LibrarySection::default(),
            dry_run: DryRunSection::default(),
            multithreading: MultithreadingSection::default(),
        }
    }
}

impl Default for LibrarySection {
    fn default() -> Self {
        Self {
            dir: Some("/manga/library".to_string()),
            is_network_path: false,
            download_dir: "/manga/downloads".to_string(),
        }
    }
}

impl Default for MultithreadingSection {
    fn default() -> Self {
        Self {
            threads: 8,
            max_queue_size: 0,
        }
    }
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            database_name: "manga_tagger".to_string(),
            host_address: "localhost".to_string(),
            port: 27017,
            username: "manga_tagger".to_string(),
            password: "Manga4LYFE".to_string(),
            auth_source: "admin".to_string(),
            server_selection_timeout_ms: 1,
            data_dir: "data".to_string(),
        }
    }
}

impl Default for LoggerSection {
    fn default() -> Self {
        Self {
            logging_level: "info".to_string(),
            log_dir: "logs".to_string(),
            rotation: LogRotation::Daily,
            backup_count: 5,
            console: SinkSection {
                enabled: true,
                format: LogFormat::Full,
            },
            file: SinkSection {
                enabled: true,
                format: LogFormat::Full,
            },
            json: SinkSection {
                enabled: true,
                format: LogFormat::Json,
            },
            tcp: NetworkSinkSection {
                enabled: false,
                format: LogFormat::Full,
                host: "localhost".to_string(),
                port: 1798,
            },
            json_tcp: NetworkSinkSection {
                enabled: false,
                format: LogFormat::Json,
                host: "localhost".to_string(),
                port: 1798,
            },
        }
    }
}
