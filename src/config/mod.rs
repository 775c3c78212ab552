pub mod env;
pub mod resolve;

use crate::error::ConfigError;
use crate::models::Settings;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

pub use env::{EnvOverrides, EnvSource, ProcessEnv};

/// File name of the configuration document.
pub const SETTINGS_FILE_NAME: &str = "settings.yaml";

/// Loads the configuration document, writing a complete default one on first
/// run so the operator always has an editable file to start from.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    settings_path: Utf8PathBuf,
}

impl ConfigStore {
    /// Create a ConfigStore whose document lives in `config_dir`.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Self {
        Self {
            settings_path: config_dir.as_ref().join(SETTINGS_FILE_NAME),
        }
    }

    /// Create a ConfigStore for `settings.yaml` in the current working
    /// directory, the service's canonical location.
    pub fn in_working_dir() -> anyhow::Result<Self> {
        let cwd = std::env::current_dir()?;
        let cwd = Utf8PathBuf::try_from(cwd)?;
        Ok(Self::new(cwd))
    }

    /// Load the configuration document.
    ///
    /// # Errors
    /// Any read or parse failure is a [`ConfigError`]; a half-read document is
    /// never patched up with defaults.
    pub fn load(&self) -> Result<Settings, ConfigError> {
        if !self.settings_path.exists() {
            return self.create_default();
        }

        let file_contents =
            fs::read_to_string(&self.settings_path).map_err(|source| ConfigError::Read {
                path: self.settings_path.clone(),
                source,
            })?;

        let settings: Settings =
            serde_yaml_ng::from_str(&file_contents).map_err(|source| ConfigError::Malformed {
                path: self.settings_path.clone(),
                source,
            })?;

        Ok(settings)
    }

    /// Write `settings` to the document path.
    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        let yaml_string = serde_yaml_ng::to_string(settings)?;

        if let Some(parent) = self.settings_path.parent() {
            if !parent.as_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        fs::write(&self.settings_path, yaml_string).map_err(|source| ConfigError::Write {
            path: self.settings_path.clone(),
            source,
        })
    }

    fn create_default(&self) -> Result<Settings, ConfigError> {
        let settings = Settings::default();
        self.save(&settings)?;
        Ok(settings)
    }

    /// Get the configuration document path.
    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}
