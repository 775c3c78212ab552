use crate::models::{DatabaseSettings, TaskTable};
use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fs;

/// Storage for the task-tracking tables.
#[cfg_attr(test, mockall::automock)]
pub trait Persistence: Send {
    /// Apply connection parameters. Called once, before `initialize`.
    fn configure(&mut self, settings: DatabaseSettings);

    /// Open and verify the connection.
    fn initialize(&mut self) -> Result<()>;

    /// Log the connection parameters at debug level, with credentials masked.
    fn print_debug_settings(&self);

    fn load_tables(&mut self) -> Result<TaskTable>;

    fn save_tables(&mut self, tables: &TaskTable) -> Result<()>;

    fn close_connection(&mut self) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredTables {
    tasks: TaskTable,
}

/// File-backed task store: one YAML document per database name under the
/// configured data directory.
#[derive(Debug, Default)]
pub struct FileStore {
    settings: Option<DatabaseSettings>,
    connected: bool,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Location of the task tables, once configured.
    pub fn tables_path(&self) -> Option<Utf8PathBuf> {
        self.settings.as_ref().map(|settings| {
            settings
                .data_dir
                .join(format!("{}.tasks.yaml", settings.database_name))
        })
    }

    fn connected_path(&self) -> Result<Utf8PathBuf> {
        if !self.connected {
            bail!("Task store is not connected");
        }
        self.tables_path().context("Task store is not configured")
    }
}

impl Persistence for FileStore {
    fn configure(&mut self, settings: DatabaseSettings) {
        self.settings = Some(settings);
        self.connected = false;
    }

    fn initialize(&mut self) -> Result<()> {
        let settings = self
            .settings
            .as_ref()
            .context("Task store must be configured before initialize")?;

        fs::create_dir_all(&settings.data_dir)
            .with_context(|| format!("Failed to create data directory {}", settings.data_dir))?;

        // A table file that exists but cannot be parsed is a connect failure
        if let Some(path) = self.tables_path()
            && path.exists()
        {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read task tables {path}"))?;
            serde_yaml_ng::from_str::<StoredTables>(&contents)
                .with_context(|| format!("Task tables {path} are corrupt"))?;
        }

        self.connected = true;
        tracing::info!("Task store ready at {}", settings.data_dir);
        Ok(())
    }

    fn print_debug_settings(&self) {
        match &self.settings {
            Some(settings) => tracing::debug!("Database settings: {settings:?}"),
            None => tracing::debug!("Database settings: not configured"),
        }
    }

    fn load_tables(&mut self) -> Result<TaskTable> {
        let path = self.connected_path()?;
        if !path.exists() {
            tracing::debug!("No task tables at {path}; starting empty");
            return Ok(TaskTable::new());
        }

        let contents =
            fs::read_to_string(&path).with_context(|| format!("Failed to read task tables {path}"))?;
        let stored: StoredTables = serde_yaml_ng::from_str(&contents)
            .with_context(|| format!("Failed to parse task tables {path}"))?;

        tracing::info!("Loaded {} task(s) from {path}", stored.tasks.len());
        Ok(stored.tasks)
    }

    fn save_tables(&mut self, tables: &TaskTable) -> Result<()> {
        let path = self.connected_path()?;
        let stored = StoredTables {
            tasks: tables.clone(),
        };
        let yaml = serde_yaml_ng::to_string(&stored).context("Failed to serialize task tables")?;

        // Write then rename so a crash never leaves a half-written table
        let staging = path.with_extension("yaml.tmp");
        fs::write(&staging, yaml).with_context(|| format!("Failed to write {staging}"))?;
        fs::rename(&staging, &path)
            .with_context(|| format!("Failed to move {staging} to {path}"))?;

        tracing::info!("Saved {} task(s) to {path}", tables.len());
        Ok(())
    }

    fn close_connection(&mut self) -> Result<()> {
        if self.connected {
            self.connected = false;
            tracing::info!("Task store closed");
        }
        Ok(())
    }
}
