//! Turns a loaded [`Settings`] document into [`EffectiveSettings`].
//!
//! Every function here is pure: it reads the document and the environment and
//! either returns a value or a [`ConfigError`]. Creating directories and
//! starting subsystems is left to the bootstrap stages.

use super::env::{self, EnvOverrides};
use crate::error::ConfigError;
use crate::models::config::{DatabaseSection, DryRunSection, LibrarySection, LoggerSection};
use crate::models::{
    DatabaseSettings, EffectiveSettings, LibrarySettings, LogLevel, LoggingSettings,
    ModeSettings, NetworkSinkSettings, Settings, SinkSettings, WorkerSettings,
};
use camino::Utf8PathBuf;

impl EffectiveSettings {
    /// Resolves every section in bootstrap order, stopping at the first fatal
    /// problem.
    pub fn resolve(document: &Settings, overrides: EnvOverrides<'_>) -> Result<Self, ConfigError> {
        let logging = resolve_logging(&document.logger, overrides)?;
        Self::resolve_with_logging(logging, document, overrides)
    }

    /// Resolves every section after logging. Bootstrap installs logging from
    /// `logging` first so that warnings raised here reach the sinks.
    pub fn resolve_with_logging(
        logging: LoggingSettings,
        document: &Settings,
        overrides: EnvOverrides<'_>,
    ) -> Result<Self, ConfigError> {
        let app = &document.application;

        let database = resolve_database(&document.database, overrides)?;
        let download_dir = resolve_download_dir(&app.library.download_dir)?;
        let timezone = overrides.text(env::TIMEZONE, &app.timezone);
        let mode = resolve_mode(&app.dry_run, overrides);
        let threads = resolve_threads(app.multithreading.threads, overrides);
        let max_queue_size = resolve_max_queue_size(app.multithreading.max_queue_size, overrides)?;
        let debug_mode = overrides.flag(env::DEBUG_MODE, app.debug_mode);
        let image_dir = app.image_dir.as_deref().map(Utf8PathBuf::from);
        let library = resolve_library(&app.library)?;

        Ok(Self {
            logging,
            database,
            timezone,
            mode,
            workers: WorkerSettings {
                download_dir,
                threads,
                max_queue_size,
                debug_mode,
                mode,
                library: library.clone(),
            },
            image_dir,
            library,
        })
    }
}

/// Validates the logging level and the network sink ports.
pub fn resolve_logging(
    logger: &LoggerSection,
    overrides: EnvOverrides<'_>,
) -> Result<LoggingSettings, ConfigError> {
    let level_text = overrides.text(env::LOGGING_LEVEL, &logger.logging_level);
    let level =
        LogLevel::parse(&level_text).ok_or(ConfigError::InvalidLoggingLevel(level_text))?;

    let settings = LoggingSettings {
        level,
        log_dir: Utf8PathBuf::from(&logger.log_dir),
        rotation: logger.rotation,
        backup_count: logger.backup_count,
        console: SinkSettings {
            enabled: overrides.flag(env::LOGGING_CONSOLE, logger.console.enabled),
            format: logger.console.format,
        },
        file: SinkSettings {
            enabled: overrides.flag(env::LOGGING_FILE, logger.file.enabled),
            format: logger.file.format,
        },
        json: SinkSettings {
            enabled: overrides.flag(env::LOGGING_JSON, logger.json.enabled),
            format: logger.json.format,
        },
        tcp: NetworkSinkSettings {
            enabled: overrides.flag(env::LOGGING_TCP, logger.tcp.enabled),
            format: logger.tcp.format,
            host: logger.tcp.host.clone(),
            port: logger.tcp.port,
        },
        json_tcp: NetworkSinkSettings {
            enabled: overrides.flag(env::LOGGING_JSON_TCP, logger.json_tcp.enabled),
            format: logger.json_tcp.format,
            host: logger.json_tcp.host.clone(),
            port: logger.json_tcp.port,
        },
    };

    if settings.tcp.enabled
        && settings.json_tcp.enabled
        && settings.tcp.port == settings.json_tcp.port
    {
        return Err(ConfigError::SinkPortConflict(settings.tcp.port));
    }

    Ok(settings)
}

pub fn resolve_database(
    database: &DatabaseSection,
    overrides: EnvOverrides<'_>,
) -> Result<DatabaseSettings, ConfigError> {
    let port = overrides.integer(env::DB_PORT, database.port)?;
    let port = u16::try_from(port).map_err(|_| ConfigError::OutOfRange {
        field: "database.port",
        value: port,
    })?;

    let timeout = overrides.integer(
        env::DB_SELECTION_TIMEOUT,
        database.server_selection_timeout_ms,
    )?;
    let server_selection_timeout_ms =
        u64::try_from(timeout).map_err(|_| ConfigError::OutOfRange {
            field: "database.server_selection_timeout_ms",
            value: timeout,
        })?;

    Ok(DatabaseSettings {
        database_name: overrides.text(env::DB_NAME, &database.database_name),
        host_address: overrides.text(env::DB_HOST_ADDRESS, &database.host_address),
        port,
        username: overrides.text(env::DB_USERNAME, &database.username),
        password: overrides.text(env::DB_PASSWORD, &database.password),
        auth_source: overrides.text(env::DB_AUTH_SOURCE, &database.auth_source),
        server_selection_timeout_ms,
        data_dir: Utf8PathBuf::from(&database.data_dir),
    })
}

pub fn resolve_download_dir(download_dir: &str) -> Result<Utf8PathBuf, ConfigError> {
    let path = Utf8PathBuf::from(download_dir);
    if !path.is_absolute() {
        return Err(ConfigError::RelativeDownloadDir(path));
    }
    Ok(path)
}

/// Dry-run is active when the variable says `true`, or when the variable is
/// unset and the document enables it. Each flag then takes its own variable
/// if set, else the document's sub-value.
pub fn resolve_mode(dry_run: &DryRunSection, overrides: EnvOverrides<'_>) -> Option<ModeSettings> {
    if !overrides.flag(env::DRY_RUN, dry_run.enabled) {
        return None;
    }

    Some(ModeSettings {
        database_insert: overrides.flag(env::DB_INSERT, dry_run.database_insert),
        rename_file: overrides.flag(env::RENAME_FILE, dry_run.rename_file),
        write_comicinfo: overrides.flag(env::WRITE_COMICINFO, dry_run.write_comicinfo),
    })
}

/// Worker thread count, floored at 1. An unparsable variable also falls back
/// to 1.
pub fn resolve_threads(document: i64, overrides: EnvOverrides<'_>) -> usize {
    let threads = match overrides.integer_var(env::THREADS) {
        Ok(Some(value)) => value,
        Ok(None) => document,
        Err(err) => {
            tracing::warn!("{err}; using a single worker thread");
            return 1;
        }
    };

    if threads <= 0 {
        tracing::debug!("Thread count {threads} is not positive; using 1");
        return 1;
    }
    usize::try_from(threads).unwrap_or(usize::MAX)
}

/// Maximum queue size, floored at 0 (unbounded).
pub fn resolve_max_queue_size(
    document: i64,
    overrides: EnvOverrides<'_>,
) -> Result<usize, ConfigError> {
    let size = overrides.integer(env::MAX_QUEUE_SIZE, document)?;
    if size < 0 {
        tracing::warn!("Max queue size {size} is negative; using 0 (unbounded)");
        return Ok(0);
    }
    Ok(usize::try_from(size).unwrap_or(usize::MAX))
}

pub fn resolve_library(library: &LibrarySection) -> Result<LibrarySettings, ConfigError> {
    let dir = library
        .dir
        .as_deref()
        .filter(|dir| !dir.trim().is_empty())
        .ok_or(ConfigError::MissingLibraryDir)?;

    Ok(LibrarySettings {
        dir: Utf8PathBuf::from(dir),
        is_network_path: library.is_network_path,
    })
}
