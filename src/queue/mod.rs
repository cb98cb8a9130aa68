//! Priority-ordered, deduplicated, persisted task queue.
//!
//! Every operation takes the queue mutex once and does its read, mutation and
//! snapshot write inside that critical section, so the file on disk always
//! matches the last completed mutation. Persistence failures are logged and
//! swallowed: the in-memory queue stays authoritative.
//!
//! Tasks are kept sorted by `(priority, added_at)`. The sort is stable, so
//! tasks with equal keys keep their insertion order.

mod counts;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::domain::{GrabTask, Resource, ResourceId, TaskStatus};
use crate::storage::SnapshotStore;

pub use counts::QueueCounts;

/// What `rebuild_from_catalog` kept and discarded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Tasks matched against the catalog and restored
    pub restored: usize,
    /// Persisted tasks with no catalog match
    pub dropped: usize,
}

pub struct TaskQueue {
    tasks: Mutex<Vec<GrabTask>>,
    store: SnapshotStore,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl TaskQueue {
    /// Create an empty queue persisting to `path`.
    ///
    /// Nothing is read from `path` here; call `rebuild_from_catalog` to
    /// restore a previous session.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self::with_store(SnapshotStore::new(path))
    }

    pub fn with_store(store: SnapshotStore) -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            store,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    fn lock(&self) -> MutexGuard<'_, Vec<GrabTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, tasks: &[GrabTask]) {
        if let Err(e) = self.store.save(tasks) {
            log::warn!("Failed to save queue to {}: {}", self.store.path().display(), e);
        }
    }

    fn sort(tasks: &mut [GrabTask]) {
        tasks.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.added_at.cmp(&b.added_at)));
    }

    /// Add a resource as a new pending task. Returns false if it is already queued.
    pub fn add(&self, resource: Resource, priority: i32) -> bool {
        let mut tasks = self.lock();
        if tasks.iter().any(|t| t.id() == resource.id) {
            return false;
        }

        log::debug!("Queueing {} with priority {}", resource, priority);
        tasks.push(GrabTask::new(resource, priority));
        Self::sort(&mut tasks);
        self.persist(&tasks);
        true
    }

    /// Remove a task. Returns false if it is not queued.
    pub fn remove(&self, id: ResourceId) -> bool {
        let mut tasks = self.lock();
        let Some(index) = tasks.iter().position(|t| t.id() == id) else {
            return false;
        };

        tasks.remove(index);
        self.persist(&tasks);
        true
    }

    /// Change a task's priority. `added_at` is kept, so ties resolve as before.
    pub fn update_priority(&self, id: ResourceId, priority: i32) -> bool {
        let mut tasks = self.lock();
        let Some(task) = tasks.iter_mut().find(|t| t.id() == id) else {
            return false;
        };

        task.priority = priority;
        Self::sort(&mut tasks);
        self.persist(&tasks);
        true
    }

    /// Pending tasks in priority order
    pub fn pending(&self) -> Vec<GrabTask> {
        self.lock().iter().filter(|t| t.is_pending()).cloned().collect()
    }

    /// Every task in priority order
    pub fn all(&self) -> Vec<GrabTask> {
        self.lock().clone()
    }

    pub fn get(&self, id: ResourceId) -> Option<GrabTask> {
        self.lock().iter().find(|t| t.id() == id).cloned()
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.lock().iter().any(|t| t.id() == id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn counts(&self) -> QueueCounts {
        QueueCounts::from_tasks(&self.lock())
    }

    /// Set a task's status and stamp `last_attempt_at`.
    ///
    /// `attempts` is bumped only when `increment_attempts` is set. Unknown ids
    /// are ignored.
    pub fn update_status(&self, id: ResourceId, status: TaskStatus, increment_attempts: bool) {
        let mut tasks = self.lock();
        let Some(task) = tasks.iter_mut().find(|t| t.id() == id) else {
            return;
        };

        if task.status != status && !task.status.can_transition_to(status) {
            log::debug!("Unusual transition for {}: {} -> {}", id, task.status, status);
        }
        task.status = status;
        task.last_attempt_at = Some(Utc::now());
        if increment_attempts {
            task.attempts += 1;
        }
        self.persist(&tasks);
    }

    /// Drop every successful task
    pub fn clear_completed(&self) {
        let mut tasks = self.lock();
        tasks.retain(|t| t.status != TaskStatus::Success);
        self.persist(&tasks);
    }

    /// Put every failed task back to pending. Attempts and `added_at` are kept.
    pub fn reset_failed(&self) {
        let mut tasks = self.lock();
        for task in tasks.iter_mut().filter(|t| t.status == TaskStatus::Failed) {
            task.status = TaskStatus::Pending;
        }
        self.persist(&tasks);
    }

    /// Put tasks left `Running` by an interrupted process back to pending.
    ///
    /// Only valid when no grab loop is driving this queue. Returns how many
    /// tasks were recovered; the snapshot is rewritten only if there were any.
    pub fn recover_interrupted(&self) -> usize {
        let mut tasks = self.lock();
        let mut recovered = 0;
        for task in tasks.iter_mut().filter(|t| t.status == TaskStatus::Running) {
            task.status = TaskStatus::Pending;
            recovered += 1;
        }
        if recovered > 0 {
            log::info!("Recovered {} interrupted task(s)", recovered);
            self.persist(&tasks);
        }
        recovered
    }

    /// Replace the queue with the persisted snapshot, keeping only tasks whose
    /// resource appears in `catalog`.
    ///
    /// Matched tasks take the catalog's current name and code but keep their
    /// persisted priority, status, attempts and timestamps. A missing snapshot
    /// gives an empty queue; an unreadable one is logged and also gives an
    /// empty queue.
    pub fn rebuild_from_catalog(&self, catalog: &[Resource]) -> RebuildReport {
        let by_id: HashMap<ResourceId, &Resource> = catalog.iter().map(|r| (r.id, r)).collect();

        let mut tasks = self.lock();
        let records = match self.store.load() {
            Ok(Some(snapshot)) => snapshot.tasks,
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("Failed to load queue from {}: {}", self.store.path().display(), e);
                Vec::new()
            }
        };

        let mut report = RebuildReport::default();
        let mut seen = HashSet::new();
        let mut rebuilt = Vec::with_capacity(records.len());
        for record in records {
            match by_id.get(&record.resource_id) {
                Some(resource) if seen.insert(record.resource_id) => {
                    rebuilt.push(record.into_task((*resource).clone()));
                    report.restored += 1;
                }
                _ => {
                    log::debug!("Dropping persisted task {}", record.resource_id);
                    report.dropped += 1;
                }
            }
        }

        Self::sort(&mut rebuilt);
        *tasks = rebuilt;
        log::info!(
            "Rebuilt queue from catalog: {} restored, {} dropped",
            report.restored,
            report.dropped
        );
        report
    }
}
