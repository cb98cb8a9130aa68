//! JSON snapshot persistence for the task queue.
//!
//! The whole queue is rewritten on every save: pretty-printed JSON, written to
//! a sibling temp file and renamed over the target so a crash mid-write never
//! leaves a truncated snapshot behind.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{GrabTask, Resource, ResourceId, TaskStatus};
use crate::error::{GrabError, Result};

fn default_priority() -> i32 {
    1
}

/// One persisted task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub resource_id: ResourceId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "Utc::now")]
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl From<&GrabTask> for TaskRecord {
    fn from(task: &GrabTask) -> Self {
        Self {
            resource_id: task.resource.id,
            name: task.resource.name.clone(),
            code: task.resource.code.clone(),
            priority: task.priority,
            added_at: task.added_at,
            status: task.status,
            attempts: task.attempts,
            last_attempt_at: task.last_attempt_at,
        }
    }
}

impl TaskRecord {
    /// Rebuild a task around a freshly supplied catalog resource
    pub fn into_task(self, resource: Resource) -> GrabTask {
        GrabTask {
            resource,
            priority: self.priority,
            added_at: self.added_at,
            status: self.status,
            attempts: self.attempts,
            last_attempt_at: self.last_attempt_at,
        }
    }
}

/// Top-level snapshot document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
    pub saved_at: DateTime<Utc>,
}

impl QueueSnapshot {
    pub fn from_tasks(tasks: &[GrabTask]) -> Self {
        Self {
            tasks: tasks.iter().map(TaskRecord::from).collect(),
            saved_at: Utc::now(),
        }
    }
}

/// File-backed snapshot store
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "queue.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Write a snapshot of `tasks`.
    pub fn save(&self, tasks: &[GrabTask]) -> Result<()> {
        let snapshot = QueueSnapshot::from_tasks(tasks);
        let json = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.temp_path();
        {
            let mut file = File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)
            .map_err(|e| GrabError::Storage(format!("Failed to move snapshot into {}: {}", self.path.display(), e)))?;

        log::debug!("Saved {} tasks to {}", snapshot.tasks.len(), self.path.display());
        Ok(())
    }

    /// Read the last snapshot. `Ok(None)` if none was ever written.
    pub fn load(&self) -> Result<Option<QueueSnapshot>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: QueueSnapshot = serde_json::from_str(&content)?;
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (SnapshotStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp_dir.path().join("queue.json"));
        (store, temp_dir)
    }

    #[test]
    fn test_load_missing_file() {
        let (store, _temp) = create_test_store();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let (store, _temp) = create_test_store();
        let mut task = GrabTask::new(Resource::new(3, "Databases", "CS340"), 2);
        task.attempts = 4;
        task.status = TaskStatus::Failed;
        task.last_attempt_at = Some(Utc::now());

        store.save(std::slice::from_ref(&task)).unwrap();
        let snapshot = store.load().unwrap().unwrap();

        assert_eq!(snapshot.tasks.len(), 1);
        assert_eq!(snapshot.tasks[0], TaskRecord::from(&task));
    }

    #[test]
    fn test_saved_file_is_readable_json() {
        let (store, _temp) = create_test_store();
        let task = GrabTask::new(Resource::new(9, "Networks", "CS330"), 1);
        store.save(&[task]).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["tasks"][0]["resource_id"], 9);
        assert_eq!(value["tasks"][0]["status"], "pending");
        assert!(value["tasks"][0]["last_attempt_at"].is_null());
        assert!(value["saved_at"].is_string());
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_load_malformed_file() {
        let (store, _temp) = create_test_store();
        fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.load(), Err(GrabError::Json(_))));
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let (store, _temp) = create_test_store();
        fs::write(
            store.path(),
            r#"{"tasks": [{"resource_id": 5}], "saved_at": "2025-02-17T08:00:00Z"}"#,
        )
        .unwrap();

        let snapshot = store.load().unwrap().unwrap();
        let record = &snapshot.tasks[0];
        assert_eq!(record.priority, 1);
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.attempts, 0);
        assert!(record.last_attempt_at.is_none());
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp_dir.path().join("nested").join("queue.json"));
        store.save(&[]).unwrap();
        assert!(store.path().exists());
    }
}
