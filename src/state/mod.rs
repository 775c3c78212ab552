// Task registry
//
// Thread-safe map of tracked tasks shared by the worker threads, the
// reconciler and the shutdown path. Every mutation is broadcast as a
// TaskChange so observers do not have to poll.

use crate::models::{TaskRecord, TaskStatus, TaskTable};
use camino::Utf8PathBuf;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Events emitted when the registry changes.
#[derive(Clone, Debug, PartialEq)]
pub enum TaskChange {
    /// A task was added in the pending state
    Queued { id: String },

    /// A task moved to a new status
    StatusChanged { id: String, status: TaskStatus },

    /// A finished task was dropped from the registry
    Completed { id: String },

    /// The registry was replaced with persisted tables
    Loaded { count: usize },
}

/// Thread-safe task registry with event emission.
///
/// Cloning is cheap; clones share the same underlying table and channel.
#[derive(Clone)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<TaskTable>>,
    change_tx: broadcast::Sender<TaskChange>,
}

impl TaskRegistry {
    /// Create an empty registry with a broadcast buffer of 100 events.
    pub fn new() -> Self {
        let (change_tx, _) = broadcast::channel(100);
        Self {
            tasks: Arc::new(RwLock::new(TaskTable::new())),
            change_tx,
        }
    }

    /// Replace the contents with persisted tables.
    pub fn load(&self, table: TaskTable) {
        let count = table.len();
        *self.tasks.write().unwrap_or_else(PoisonError::into_inner) = table;
        self.emit(TaskChange::Loaded { count });
    }

    /// Track a new pending task. Returns false if the id is already tracked.
    pub fn insert_pending(&self, id: &str, path: Utf8PathBuf) -> bool {
        {
            let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
            if tasks.contains_key(id) {
                return false;
            }
            tasks.insert(
                id.to_string(),
                TaskRecord {
                    path,
                    status: TaskStatus::Pending,
                },
            );
        }
        self.emit(TaskChange::Queued { id: id.to_string() });
        true
    }

    /// Update the status of a tracked task. Unknown ids are ignored.
    pub fn set_status(&self, id: &str, status: TaskStatus) {
        let changed = {
            let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
            match tasks.get_mut(id) {
                Some(record) if record.status != status => {
                    record.status = status;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.emit(TaskChange::StatusChanged {
                id: id.to_string(),
                status,
            });
        }
    }

    /// Drop a finished task.
    pub fn complete(&self, id: &str) {
        let removed = self
            .tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(id)
            .is_some();
        if removed {
            self.emit(TaskChange::Completed { id: id.to_string() });
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read(|tasks| tasks.contains_key(id))
    }

    pub fn status(&self, id: &str) -> Option<TaskStatus> {
        self.read(|tasks| tasks.get(id).map(|record| record.status))
    }

    /// Ids of every tracked task.
    pub fn ids(&self) -> HashSet<String> {
        self.read(|tasks| tasks.keys().cloned().collect())
    }

    /// Copy of the whole table, for persistence.
    pub fn snapshot(&self) -> TaskTable {
        self.read(|tasks| tasks.clone())
    }

    pub fn len(&self) -> usize {
        self.read(|tasks| tasks.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Execute a function with read access to the table.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&TaskTable) -> R,
    {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        f(&tasks)
    }

    /// Subscribe to registry change events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskChange> {
        self.change_tx.subscribe()
    }

    fn emit(&self, change: TaskChange) {
        // No subscribers is fine
        let _ = self.change_tx.send(change);
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
