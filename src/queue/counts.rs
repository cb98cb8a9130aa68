//! Per-status task counts.

use serde::Serialize;

use crate::domain::{GrabTask, TaskStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub success: usize,
    pub failed: usize,
}

impl QueueCounts {
    pub fn from_tasks(tasks: &[GrabTask]) -> Self {
        tasks.iter().fold(
            Self {
                total: tasks.len(),
                ..Default::default()
            },
            |mut counts, task| {
                match task.status {
                    TaskStatus::Pending => counts.pending += 1,
                    TaskStatus::Running => counts.running += 1,
                    TaskStatus::Success => counts.success += 1,
                    TaskStatus::Failed => counts.failed += 1,
                }
                counts
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Resource;

    #[test]
    fn test_counts_empty() {
        assert_eq!(QueueCounts::from_tasks(&[]), QueueCounts::default());
    }

    #[test]
    fn test_counts_by_status() {
        let statuses = [
            TaskStatus::Pending,
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Success,
            TaskStatus::Failed,
        ];
        let tasks: Vec<GrabTask> = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                let mut task = GrabTask::new(Resource::new(i as u64, "n", "c"), 1);
                task.status = *status;
                task
            })
            .collect();

        let counts = QueueCounts::from_tasks(&tasks);
        assert_eq!(counts.total, 5);
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.running, 1);
        assert_eq!(counts.success, 1);
        assert_eq!(counts.failed, 1);
    }
}
