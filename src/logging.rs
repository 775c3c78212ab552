use crate::models::{LogFormat, LogRotation, LoggingSettings, NetworkSinkSettings};
use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::net::TcpStream;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// File name prefix shared by every file sink.
pub const LOG_FILE_PREFIX: &str = "manga-tagger";

const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Keeps the non-blocking writers flushing. Must be held for the life of the
/// program; dropping it flushes and closes every sink.
#[derive(Default)]
pub struct LoggingGuard {
    _guards: Vec<WorkerGuard>,
}

/// Create the log directory if it is missing.
pub fn ensure_log_dir(log_dir: &Utf8Path) -> Result<()> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }
    Ok(())
}

/// Install one subscriber layer per enabled sink.
///
/// Sink problems (a log directory that cannot be created, a TCP collector
/// that does not answer) drop that sink and are reported as warnings once the
/// remaining sinks are up. If a global subscriber is already installed the
/// existing one is kept.
pub fn setup_logging(settings: &LoggingSettings) -> Result<LoggingGuard> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guards = Vec::new();
    let mut warnings = Vec::new();

    if settings.console.enabled {
        layers.push(format_layer(settings.console.format, std::io::stdout, true));
    }

    let log_dir_ready = match ensure_log_dir(&settings.log_dir) {
        Ok(()) => true,
        Err(err) => {
            warnings.push(format!("{err:#}; file logging disabled"));
            false
        }
    };

    if log_dir_ready {
        for (sink, suffix) in [(&settings.file, "log"), (&settings.json, "json")] {
            if !sink.enabled {
                continue;
            }
            match rolling_appender(settings, suffix) {
                Ok(appender) => {
                    let (writer, guard) = tracing_appender::non_blocking(appender);
                    layers.push(format_layer(sink.format, writer, false));
                    guards.push(guard);
                }
                Err(err) => warnings.push(format!("{err:#}; {suffix} file sink disabled")),
            }
        }
    }

    for (name, sink) in [("TCP", &settings.tcp), ("JSON TCP", &settings.json_tcp)] {
        if !sink.enabled {
            continue;
        }
        match connect(sink) {
            Ok(stream) => {
                let (writer, guard) = tracing_appender::non_blocking(stream);
                layers.push(format_layer(sink.format, writer, false));
                guards.push(guard);
            }
            Err(err) => warnings.push(format!("{err:#}; {name} sink disabled")),
        }
    }

    let sink_count = layers.len();
    let installed = tracing_subscriber::registry()
        .with(layers)
        .with(EnvFilter::new(settings.level.as_str()))
        .try_init()
        .is_ok();

    if !installed {
        tracing::debug!("A global subscriber is already installed; keeping it");
    }

    for warning in &warnings {
        tracing::warn!("{warning}");
    }

    tracing::info!(
        "Logging initialized: dir={}, level={}, sinks={}",
        settings.log_dir,
        settings.level,
        sink_count
    );

    Ok(LoggingGuard { _guards: guards })
}

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true)
        .with_thread_names(true)
        .with_thread_ids(true);

    match format {
        LogFormat::Full => layer.boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

fn rolling_appender(settings: &LoggingSettings, suffix: &str) -> Result<RollingFileAppender> {
    let rotation = match settings.rotation {
        LogRotation::Minutely => Rotation::MINUTELY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(suffix);
    if settings.backup_count > 0 {
        builder = builder.max_log_files(settings.backup_count);
    }

    builder
        .build(&settings.log_dir)
        .with_context(|| format!("Failed to open {suffix} log in {}", settings.log_dir))
}

fn connect(sink: &NetworkSinkSettings) -> Result<TcpStream> {
    use std::net::ToSocketAddrs;

    let address = (sink.host.as_str(), sink.port)
        .to_socket_addrs()
        .with_context(|| format!("Failed to resolve {}:{}", sink.host, sink.port))?
        .next()
        .with_context(|| format!("No address found for {}:{}", sink.host, sink.port))?;

    TcpStream::connect_timeout(&address, TCP_CONNECT_TIMEOUT)
        .with_context(|| format!("Failed to connect to log collector at {address}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LogLevel, SinkSettings};
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn quiet_settings(log_dir: Utf8PathBuf) -> LoggingSettings {
        let off = SinkSettings {
            enabled: false,
            format: LogFormat::Full,
        };
        let network_off = NetworkSinkSettings {
            enabled: false,
            format: LogFormat::Json,
            host: "localhost".to_string(),
            port: 1798,
        };
        LoggingSettings {
            level: LogLevel::Debug,
            log_dir,
            rotation: LogRotation::Never,
            backup_count: 0,
            console: off,
            file: off,
            json: off,
            tcp: network_off.clone(),
            json_tcp: network_off,
        }
    }

    #[test]
    fn test_log_directory_created() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = Utf8PathBuf::try_from(temp_dir.path().join("logs")).unwrap();

        ensure_log_dir(&log_dir).unwrap();

        assert!(log_dir.exists());
    }

    #[test]
    fn test_setup_logging_creates_directory_without_file_sinks() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = Utf8PathBuf::try_from(temp_dir.path().join("logs")).unwrap();

        let guard = setup_logging(&quiet_settings(log_dir.clone())).unwrap();

        assert!(log_dir.exists());
        assert!(guard._guards.is_empty());
    }

    #[test]
    fn test_setup_logging_with_file_sink() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = Utf8PathBuf::try_from(temp_dir.path().join("nested/logs")).unwrap();
        let mut settings = quiet_settings(log_dir.clone());
        settings.file.enabled = true;

        // May find a subscriber from another test already installed; the
        // directory and guard are still produced.
        let guard = setup_logging(&settings).unwrap();

        assert!(log_dir.exists());
        assert_eq!(guard._guards.len(), 1);
    }

    #[test]
    fn test_unreachable_tcp_sink_is_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let mut settings = quiet_settings(log_dir);
        // Bind then drop a listener so the port is very likely closed.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        settings.tcp.enabled = true;
        settings.tcp.host = "127.0.0.1".to_string();
        settings.tcp.port = port;

        let guard = setup_logging(&settings).unwrap();
        assert!(guard._guards.is_empty());
    }

    #[test]
    fn test_reachable_tcp_sink_is_kept() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let temp_dir = TempDir::new().unwrap();
        let log_dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let mut settings = quiet_settings(log_dir);
        settings.json_tcp.enabled = true;
        settings.json_tcp.host = "127.0.0.1".to_string();
        settings.json_tcp.port = port;

        let guard = setup_logging(&settings).unwrap();
        assert_eq!(guard._guards.len(), 1);
    }
}
