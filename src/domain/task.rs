//! Grab task and resource types
//!
//! A `Resource` is one acquirable seat target as listed by the catalog. A
//! `GrabTask` wraps a resource with the queue's scheduling state: priority,
//! status, attempt counter and timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a resource (the course id on the backend)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ResourceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A catalog entry: something a task can target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
}

impl Resource {
    pub fn new(id: u64, name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: ResourceId(id),
            name: name.into(),
            code: code.into(),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} - {}", self.id, self.name, self.code)
    }
}

/// Status of a grab task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting for its turn in the next round
    #[default]
    Pending,
    /// An attempt is in flight
    Running,
    /// Seat acquired
    Success,
    /// Given up on; only an explicit reset brings it back
    Failed,
}

impl TaskStatus {
    /// Whether `next` is one of the transitions the grab loop and the queue's
    /// maintenance operations produce.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Success)
                | (TaskStatus::Running, TaskStatus::Pending)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Failed, TaskStatus::Pending)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queued acquisition target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrabTask {
    pub resource: Resource,

    /// Lower value is attempted first
    pub priority: i32,

    /// Insertion time, tie-break for equal priorities
    pub added_at: DateTime<Utc>,

    pub status: TaskStatus,

    /// Completed attempts (successful or not)
    pub attempts: u32,

    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl GrabTask {
    /// Create a fresh pending task
    pub fn new(resource: Resource, priority: i32) -> Self {
        Self {
            resource,
            priority,
            added_at: Utc::now(),
            status: TaskStatus::Pending,
            attempts: 0,
            last_attempt_at: None,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.resource.id
    }

    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }
}
