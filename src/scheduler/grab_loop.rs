//! The grab loop: rounds of sequential, paced attempts over pending tasks.
//!
//! Each round:
//! 1. Snapshots the pending tasks (priority order)
//! 2. Attempts them one at a time, waiting `grab_interval` after each
//! 3. Ends the run if nothing is pending any more
//! 4. Otherwise waits `round_interval` (2 × `grab_interval`) and starts over
//!
//! Cancellation is checked before every attempt and interrupts both waits. An
//! attempt already handed to the acquirer always runs to completion.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::acquire::{Acquirer, Attempt};
use crate::domain::{EventSink, GrabOutcome, GrabTask, TaskStatus};
use crate::error::{GrabError, Result};
use crate::queue::TaskQueue;

/// Shortest accepted pause between attempts
pub const MIN_GRAB_INTERVAL: Duration = Duration::from_millis(100);
/// Longest accepted pause between attempts
pub const MAX_GRAB_INTERVAL: Duration = Duration::from_secs(60);

/// Check a grab interval against the accepted range.
pub fn validate_interval(interval: Duration) -> Result<Duration> {
    if interval < MIN_GRAB_INTERVAL {
        return Err(GrabError::InvalidInterval(format!(
            "{:.3}s is below the minimum of {:.1}s",
            interval.as_secs_f64(),
            MIN_GRAB_INTERVAL.as_secs_f64()
        )));
    }
    if interval > MAX_GRAB_INTERVAL {
        return Err(GrabError::InvalidInterval(format!(
            "{:.3}s exceeds the maximum of {}s",
            interval.as_secs_f64(),
            MAX_GRAB_INTERVAL.as_secs()
        )));
    }
    Ok(interval)
}

/// Pacing and retry settings for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrabLoopConfig {
    /// Pause after each attempt
    pub grab_interval: Duration,
    /// Failed attempts after which a task is marked failed; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for GrabLoopConfig {
    fn default() -> Self {
        Self {
            grab_interval: Duration::from_secs(1),
            max_attempts: None,
        }
    }
}

impl GrabLoopConfig {
    pub fn new(grab_interval: Duration) -> Self {
        Self {
            grab_interval,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Pause between rounds
    pub fn round_interval(&self) -> Duration {
        self.grab_interval * 2
    }
}

/// One run of the grab loop. Built fresh for every start.
pub struct GrabLoop {
    queue: Arc<TaskQueue>,
    acquirer: Arc<dyn Acquirer>,
    events: EventSink,
    config: GrabLoopConfig,
    cancel: CancellationToken,
}

impl GrabLoop {
    pub fn new(
        queue: Arc<TaskQueue>,
        acquirer: Arc<dyn Acquirer>,
        events: EventSink,
        config: GrabLoopConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue,
            acquirer,
            events,
            config,
            cancel,
        }
    }

    /// Run rounds until nothing is pending or cancellation is observed.
    pub async fn run(&self) -> GrabOutcome {
        let mut round = 0u32;

        loop {
            let pending = self.queue.pending();
            if pending.is_empty() {
                self.events.log("No pending tasks left, grabbing finished");
                return GrabOutcome::Completed;
            }

            round += 1;
            self.events
                .log(format!("Round {} started, {} pending", round, pending.len()));

            for task in &pending {
                if self.cancel.is_cancelled() {
                    self.events.log(format!("Round {} aborted by stop request", round));
                    return GrabOutcome::Stopped;
                }

                // Removed or changed by the caller since the snapshot
                if !self.queue.get(task.id()).is_some_and(|t| t.is_pending()) {
                    log::debug!("Skipping {}, no longer pending", task.resource);
                    continue;
                }

                self.attempt(task).await;

                if !self.pause(self.config.grab_interval).await {
                    self.events.log(format!("Round {} aborted by stop request", round));
                    return GrabOutcome::Stopped;
                }
            }

            if self.queue.pending().is_empty() {
                match self.queue.counts().failed {
                    0 => self.events.log("All tasks acquired"),
                    failed => self
                        .events
                        .log(format!("No pending tasks left, {} failed", failed)),
                }
                return GrabOutcome::Completed;
            }

            self.events
                .log(format!("Round {} finished, waiting for the next round", round));
            if !self.pause(self.config.round_interval()).await {
                return GrabOutcome::Stopped;
            }
        }
    }

    /// Sleep for `duration` unless cancelled first. Returns false on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Attempt one task and record the outcome in the queue.
    async fn attempt(&self, task: &GrabTask) {
        let id = task.id();
        self.queue.update_status(id, TaskStatus::Running, false);
        self.events.log(format!(
            "Attempting {} [priority {}]",
            task.resource, task.priority
        ));

        let result = AssertUnwindSafe(self.acquirer.attempt(&task.resource))
            .catch_unwind()
            .await;

        let reason = match result {
            Ok(Ok(Attempt::Acquired)) => None,
            Ok(Ok(Attempt::Rejected { reason })) => Some(reason),
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(format!("acquirer panicked: {}", panic_message(panic.as_ref()))),
        };

        let Some(reason) = reason else {
            self.queue.update_status(id, TaskStatus::Success, true);
            self.events.log(format!("Acquired {}", task.resource));
            return;
        };

        let attempts = self.queue.get(id).map_or(task.attempts, |t| t.attempts) + 1;
        let exhausted = self.config.max_attempts.is_some_and(|max| attempts >= max);
        if exhausted {
            self.queue.update_status(id, TaskStatus::Failed, true);
            self.events.log(format!(
                "Giving up on {} after {} attempts: {}",
                task.resource, attempts, reason
            ));
        } else {
            self.queue.update_status(id, TaskStatus::Pending, true);
            self.events
                .log(format!("Failed to acquire {}: {}", task.resource, reason));
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::{MockAcquirer, MockReply};
    use crate::domain::{GrabEvent, Resource, ResourceId};
    use tempfile::TempDir;

    const FAST: Duration = Duration::from_millis(10);

    fn create_queue(ids: &[(u64, i32)]) -> (Arc<TaskQueue>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let queue = Arc::new(TaskQueue::open(temp_dir.path().join("queue.json")));
        for (id, priority) in ids {
            queue.add(Resource::new(*id, format!("Course {}", id), format!("C{}", id)), *priority);
        }
        (queue, temp_dir)
    }

    fn create_loop(queue: &Arc<TaskQueue>, acquirer: Arc<MockAcquirer>, config: GrabLoopConfig) -> (GrabLoop, CancellationToken) {
        let cancel = CancellationToken::new();
        let grab_loop = GrabLoop::new(queue.clone(), acquirer, EventSink::default(), config, cancel.clone());
        (grab_loop, cancel)
    }

    #[test]
    fn test_validate_interval() {
        assert!(validate_interval(Duration::from_millis(500)).is_ok());
        assert!(validate_interval(MIN_GRAB_INTERVAL).is_ok());
        assert!(validate_interval(MAX_GRAB_INTERVAL).is_ok());
        assert!(matches!(
            validate_interval(Duration::from_millis(50)),
            Err(GrabError::InvalidInterval(_))
        ));
        assert!(validate_interval(Duration::from_secs(61)).is_err());
    }

    #[test]
    fn test_round_interval_is_double() {
        let config = GrabLoopConfig::new(Duration::from_millis(750));
        assert_eq!(config.round_interval(), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_attempts_in_priority_order() {
        let (queue, _temp) = create_queue(&[(2, 2), (1, 1), (3, 3)]);
        let acquirer = Arc::new(MockAcquirer::new().with_default(MockReply::Acquired));
        let (grab_loop, _cancel) = create_loop(&queue, acquirer.clone(), GrabLoopConfig::new(FAST));

        assert_eq!(grab_loop.run().await, GrabOutcome::Completed);
        assert_eq!(acquirer.calls(), vec![ResourceId(1), ResourceId(2), ResourceId(3)]);
        assert!(queue.all().iter().all(|t| t.status == TaskStatus::Success && t.attempts == 1));
    }

    #[tokio::test]
    async fn test_failures_are_retried_next_round() {
        let (queue, _temp) = create_queue(&[(1, 1), (2, 2)]);
        let acquirer = Arc::new(
            MockAcquirer::new()
                .with_default(MockReply::Acquired)
                .script(1, [MockReply::Rejected("full".into()), MockReply::Error("reset".into())]),
        );
        let (grab_loop, _cancel) = create_loop(&queue, acquirer.clone(), GrabLoopConfig::new(FAST));

        assert_eq!(grab_loop.run().await, GrabOutcome::Completed);
        assert_eq!(
            acquirer.calls(),
            vec![ResourceId(1), ResourceId(2), ResourceId(1), ResourceId(1)]
        );
        let task = queue.get(ResourceId(1)).unwrap();
        assert_eq!(task.status, TaskStatus::Success);
        assert_eq!(task.attempts, 3);
    }

    #[tokio::test]
    async fn test_panicking_acquirer_counts_as_failure() {
        let (queue, _temp) = create_queue(&[(1, 1)]);
        let acquirer = Arc::new(
            MockAcquirer::new()
                .with_default(MockReply::Acquired)
                .script(1, [MockReply::Panic("boom".into())]),
        );
        let (grab_loop, _cancel) = create_loop(&queue, acquirer.clone(), GrabLoopConfig::new(FAST));

        assert_eq!(grab_loop.run().await, GrabOutcome::Completed);
        assert_eq!(acquirer.call_count(), 2);
        assert_eq!(queue.get(ResourceId(1)).unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn test_failure_reverts_to_pending_by_default() {
        let (queue, _temp) = create_queue(&[(1, 1)]);
        let acquirer = Arc::new(MockAcquirer::new());
        let (grab_loop, cancel) = create_loop(&queue, acquirer.clone(), GrabLoopConfig::new(FAST));

        let handle = tokio::spawn(async move { grab_loop.run().await });
        while acquirer.call_count() < 3 {
            tokio::time::sleep(FAST).await;
        }
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), GrabOutcome::Stopped);
        let task = queue.get(ResourceId(1)).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.attempts >= 3);
        assert_eq!(queue.counts().failed, 0);
    }

    #[tokio::test]
    async fn test_max_attempts_marks_failed() {
        let (queue, _temp) = create_queue(&[(1, 1)]);
        let acquirer = Arc::new(MockAcquirer::new());
        let config = GrabLoopConfig::new(FAST).with_max_attempts(Some(2));
        let (grab_loop, _cancel) = create_loop(&queue, acquirer.clone(), config);

        assert_eq!(grab_loop.run().await, GrabOutcome::Completed);
        let task = queue.get(ResourceId(1)).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.attempts, 2);
        assert_eq!(acquirer.call_count(), 2);
    }

    #[tokio::test]
    async fn test_cancel_before_second_task_leaves_it_untouched() {
        let (queue, _temp) = create_queue(&[(1, 1), (2, 2)]);
        let acquirer = Arc::new(MockAcquirer::new());
        let config = GrabLoopConfig::new(Duration::from_secs(30));
        let (grab_loop, cancel) = create_loop(&queue, acquirer.clone(), config);

        let handle = tokio::spawn(async move { grab_loop.run().await });
        while acquirer.call_count() < 1 {
            tokio::time::sleep(FAST).await;
        }
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), GrabOutcome::Stopped);
        assert_eq!(acquirer.calls(), vec![ResourceId(1)]);
        let second = queue.get(ResourceId(2)).unwrap();
        assert_eq!(second.status, TaskStatus::Pending);
        assert_eq!(second.attempts, 0);
        assert!(second.last_attempt_at.is_none());
    }

    #[tokio::test]
    async fn test_in_flight_attempt_completes_after_cancel() {
        let (queue, _temp) = create_queue(&[(1, 1)]);
        let acquirer = Arc::new(
            MockAcquirer::new()
                .with_default(MockReply::Acquired)
                .with_delay(Duration::from_millis(200)),
        );
        let (grab_loop, cancel) = create_loop(&queue, acquirer.clone(), GrabLoopConfig::new(FAST));

        let handle = tokio::spawn(async move { grab_loop.run().await });
        while acquirer.call_count() < 1 {
            tokio::time::sleep(FAST).await;
        }
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), GrabOutcome::Stopped);
        assert_eq!(queue.get(ResourceId(1)).unwrap().status, TaskStatus::Success);
    }

    #[tokio::test]
    async fn test_removed_task_is_skipped() {
        let (queue, _temp) = create_queue(&[(1, 1), (2, 2)]);
        let acquirer = Arc::new(
            MockAcquirer::new()
                .with_default(MockReply::Acquired)
                .with_delay(Duration::from_millis(100)),
        );
        let (grab_loop, _cancel) = create_loop(&queue, acquirer.clone(), GrabLoopConfig::new(FAST));

        let handle = tokio::spawn(async move { grab_loop.run().await });
        while acquirer.call_count() < 1 {
            tokio::time::sleep(FAST).await;
        }
        queue.remove(ResourceId(2));

        assert_eq!(handle.await.unwrap(), GrabOutcome::Completed);
        assert_eq!(acquirer.calls(), vec![ResourceId(1)]);
    }

    #[tokio::test]
    async fn test_logs_progress() {
        let (queue, _temp) = create_queue(&[(1, 1)]);
        let acquirer = Arc::new(MockAcquirer::new().with_default(MockReply::Acquired));
        let events = EventSink::default();
        let mut rx = events.subscribe();
        let grab_loop = GrabLoop::new(
            queue.clone(),
            acquirer,
            events,
            GrabLoopConfig::new(FAST),
            CancellationToken::new(),
        );

        grab_loop.run().await;

        let mut lines = Vec::new();
        while let Ok(GrabEvent::Log(line)) = rx.try_recv() {
            lines.push(line);
        }
        assert!(lines.iter().any(|l| l.starts_with("Round 1 started")));
        assert!(lines.iter().any(|l| l.starts_with("Acquired [1]")));
        assert_eq!(lines.last().map(String::as_str), Some("All tasks acquired"));
    }
}
