use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// File extension of the archives the service picks up.
pub const ARCHIVE_EXTENSION: &str = "cbz";

/// Tracked tasks keyed by task id, in enqueue order.
pub type TaskTable = IndexMap<String, TaskRecord>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub path: Utf8PathBuf,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Failed,
}

impl TaskStatus {
    /// Whether a persisted task with this status should be queued again.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Returns the task id for an archive path: its file name without the
/// archive extension. `None` for anything that is not an archive.
pub fn archive_stem(path: &Utf8Path) -> Option<&str> {
    let extension = path.extension()?;
    if !extension.eq_ignore_ascii_case(ARCHIVE_EXTENSION) {
        return None;
    }
    path.file_stem()
}
