use camino::Utf8PathBuf;
use std::fmt;
use thiserror::Error;

/// Configuration problems the service cannot start with.
///
/// None of these are retried. The top-level caller logs the error and exits
/// with a non-zero status.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration document {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed configuration document {path}: {source}")]
    Malformed {
        path: Utf8PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("Failed to write default configuration document {path}: {source}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize default configuration document: {0}")]
    Serialize(#[from] serde_yaml_ng::Error),

    #[error(
        "Logging level {0:?} is not one of the expected values \"info\" or \"debug\"; \
         double check the configuration and try again"
    )]
    InvalidLoggingLevel(String),

    #[error(
        "TCP and JSON TCP logging are both enabled on port {0}; change one of the ports \
         or disable one of the sinks"
    )]
    SinkPortConflict(u16),

    #[error("{var} must be an integer, got {value:?}")]
    InvalidInteger { var: &'static str, value: String },

    #[error("{field} value {value} is out of range")]
    OutOfRange { field: &'static str, value: i64 },

    #[error(
        "Download directory \"{0}\" is not an absolute path; it must look like \"/manga\""
    )]
    RelativeDownloadDir(Utf8PathBuf),

    #[error(
        "No library directory is configured; set application.library.dir so processed \
         files have somewhere to go"
    )]
    MissingLibraryDir,

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Collaborator stages of the startup sequence, in execution order.
/// Directory preparation fails with [`ConfigError::CreateDir`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Logging,
    PersistenceConnect,
    LoadTaskTables,
    StartWorkers,
    Reconcile,
    MetadataApi,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Logging => "logging",
            Self::PersistenceConnect => "persistence connect",
            Self::LoadTaskTables => "load task tables",
            Self::StartWorkers => "start workers",
            Self::Reconcile => "reconcile download directory",
            Self::MetadataApi => "metadata api",
        };
        f.write_str(s)
    }
}

/// Why bootstrap stopped.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error(transparent)]
    Fatal(#[from] ConfigError),

    #[error("{stage} failed: {source:#}")]
    Collaborator {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },
}

impl BootstrapError {
    pub(crate) fn collaborator(stage: Stage) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Collaborator { stage, source }
    }

    pub fn is_fatal_configuration(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_error_names_stage() {
        let err = BootstrapError::collaborator(Stage::PersistenceConnect)(anyhow::anyhow!(
            "connection refused"
        ));
        assert_eq!(
            err.to_string(),
            "persistence connect failed: connection refused"
        );
        assert!(!err.is_fatal_configuration());
    }

    #[test]
    fn test_config_error_is_fatal() {
        let err: BootstrapError = ConfigError::MissingLibraryDir.into();
        assert!(err.is_fatal_configuration());
    }
}
