//! Task Record Store - one JSON file per task under `tasks/`
//!
//! Writes go through temp + rename so a reader never observes a partial
//! record. Unparseable records are skipped and reported, never fatal.

use crate::task::{Task, TaskId};
use fleet_foundation::{remove_if_exists, Error, JsonStore, Result, Workspace};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Result of scanning the task directory
#[derive(Debug, Default)]
pub struct StoreScan {
    /// Every record that parsed
    pub tasks: Vec<Task>,
    /// Paths of records that failed to parse
    pub corrupt: Vec<PathBuf>,
}

/// File-backed task records
#[derive(Debug, Clone)]
pub struct TaskStore {
    workspace: Workspace,
    records: JsonStore,
}

impl TaskStore {
    pub fn new(workspace: Workspace) -> Self {
        let records = JsonStore::new(workspace.tasks_dir());
        Self { workspace, records }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    fn file_name(id: &TaskId) -> String {
        format!("{}.json", id)
    }

    pub fn record_path(&self, id: &TaskId) -> PathBuf {
        self.workspace.task_record(id.as_str())
    }

    /// Persist the full record atomically
    pub fn save(&self, task: &Task) -> Result<()> {
        self.records.save(&Self::file_name(&task.id), task)
    }

    /// Load one record; `None` if it does not exist
    pub fn load(&self, id: &TaskId) -> Result<Option<Task>> {
        self.records.load_optional(&Self::file_name(id))
    }

    /// Ids of every record file, in no particular order
    pub fn list_ids(&self) -> Result<Vec<TaskId>> {
        let mut ids = Vec::new();
        for name in self.records.list_json()? {
            let stem = name.trim_end_matches(".json");
            match TaskId::parse(stem) {
                Ok(id) => ids.push(id),
                Err(_) => debug!("Ignoring unexpected file in task directory: {}", name),
            }
        }
        Ok(ids)
    }

    /// Every record found; corrupt ones are logged and skipped
    pub fn load_all(&self) -> Result<StoreScan> {
        let mut scan = StoreScan::default();
        for id in self.list_ids()? {
            match self.load(&id) {
                Ok(Some(task)) => scan.tasks.push(task),
                Ok(None) => {}
                Err(e @ Error::StoreCorruption { .. }) => {
                    warn!("Skipping task record: {}", e);
                    scan.corrupt.push(self.record_path(&id));
                }
                Err(e) => {
                    warn!("Failed to read task record {}: {}", id, e);
                    scan.corrupt.push(self.record_path(&id));
                }
            }
        }
        Ok(scan)
    }

    /// Remove the record and every file derived from the id.
    /// Missing files are not an error.
    pub fn delete(&self, task: &Task) -> Result<()> {
        let id = task.id.as_str();
        self.records.remove(&Self::file_name(&task.id))?;
        remove_if_exists(&task.log_file)?;
        remove_if_exists(&task.result_file)?;
        remove_if_exists(&self.workspace.task_params(id))?;
        remove_if_exists(&self.workspace.kill_request(id))?;
        Ok(())
    }

    // ========================================================================
    // Kill requests (written by out-of-process callers)
    // ========================================================================

    /// Leave a kill request for the running daemon
    pub fn request_kill(&self, id: &TaskId) -> Result<()> {
        let path = self.workspace.kill_request(id.as_str());
        fleet_foundation::atomic_write(&path, b"")
    }

    /// Consume pending kill requests
    pub fn take_kill_requests(&self) -> Result<Vec<TaskId>> {
        let dir = self.workspace.tasks_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(stem) = name.strip_suffix(".kill") else {
                continue;
            };
            remove_if_exists(&entry.path())?;
            if let Ok(id) = TaskId::parse(stem) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TaskState;
    use crate::task::TaskRequest;
    use tempfile::TempDir;

    fn setup() -> (TempDir, TaskStore) {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path());
        ws.ensure().unwrap();
        (dir, TaskStore::new(ws))
    }

    fn new_task(store: &TaskStore) -> Task {
        Task::from_request(TaskRequest::new("qwen", "run"), store.workspace())
    }

    #[test]
    fn test_save_and_load() {
        let (_dir, store) = setup();
        let mut task = new_task(&store);
        store.save(&task).unwrap();

        task.start();
        store.save(&task).unwrap();

        let loaded = store.load(&task.id).unwrap().unwrap();
        assert_eq!(loaded.status, TaskState::Running);
        assert_eq!(loaded, task);
    }

    #[test]
    fn test_load_all_skips_corrupt_records() {
        let (_dir, store) = setup();
        let task = new_task(&store);
        store.save(&task).unwrap();
        std::fs::write(
            store.workspace().task_record("task-broken"),
            "{\"id\": \"task-broken\", \"status\": ",
        )
        .unwrap();

        let scan = store.load_all().unwrap();
        assert_eq!(scan.tasks.len(), 1);
        assert_eq!(scan.tasks[0].id, task.id);
        assert_eq!(scan.corrupt.len(), 1);
    }

    #[test]
    fn test_delete_removes_derived_files() {
        let (_dir, store) = setup();
        let task = new_task(&store);
        store.save(&task).unwrap();
        std::fs::write(&task.log_file, "output").unwrap();
        std::fs::write(store.workspace().task_params(task.id.as_str()), "{}").unwrap();

        store.delete(&task).unwrap();

        assert!(store.load(&task.id).unwrap().is_none());
        assert!(!task.log_file.exists());
        assert!(!store.workspace().task_params(task.id.as_str()).exists());

        // second delete is fine
        store.delete(&task).unwrap();
    }

    #[test]
    fn test_kill_requests_consumed_once() {
        let (_dir, store) = setup();
        let task = new_task(&store);
        store.request_kill(&task.id).unwrap();

        let ids = store.take_kill_requests().unwrap();
        assert_eq!(ids, vec![task.id.clone()]);
        assert!(store.take_kill_requests().unwrap().is_empty());
    }

    #[test]
    fn test_list_ids_ignores_other_files() {
        let (_dir, store) = setup();
        let task = new_task(&store);
        store.save(&task).unwrap();
        store.request_kill(&task.id).unwrap();

        let ids = store.list_ids().unwrap();
        assert_eq!(ids, vec![task.id]);
    }
}
