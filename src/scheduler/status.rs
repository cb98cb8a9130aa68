//! Read-only status snapshot of a scheduler.

use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::queue::QueueCounts;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub is_running: bool,
    /// Wall-clock time of the armed trigger, if any
    pub scheduled_at: Option<DateTime<FixedOffset>>,
    pub total_tasks: usize,
    pub pending_count: usize,
    pub running_count: usize,
    pub success_count: usize,
    pub failed_count: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub grab_interval: Duration,
}

fn serialize_secs<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

impl StatusSnapshot {
    pub fn new(
        is_running: bool,
        scheduled_at: Option<DateTime<FixedOffset>>,
        counts: QueueCounts,
        grab_interval: Duration,
    ) -> Self {
        Self {
            is_running,
            scheduled_at,
            total_tasks: counts.total,
            pending_count: counts.pending,
            running_count: counts.running,
            success_count: counts.success,
            failed_count: counts.failed,
            grab_interval,
        }
    }
}
