//! Scheduler: owns the grab loop's lifecycle.
//!
//! This module provides:
//! - **Scheduler**: "run now" and "run at wall-clock time T" entry points,
//!   admission control (one grab loop at a time), cooperative stop, and
//!   status snapshots.
//! - **GrabLoop**: the retry state machine over the task queue.
//! - **Trigger**: the one-shot wall-clock trigger that starts a run.
//!
//! # Example
//!
//! ```ignore
//! use seatgrab::scheduler::{Scheduler, SchedulerConfig};
//!
//! let scheduler = Scheduler::new(queue, acquirer, SchedulerConfig::default())?;
//! let mut events = scheduler.subscribe();
//! scheduler.start_immediate();
//! ```

mod grab_loop;
mod status;
mod trigger;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::acquire::Acquirer;
use crate::domain::{EventSink, GrabEvent, GrabOutcome, RunStatus};
use crate::error::{GrabError, Result};
use crate::queue::TaskQueue;

pub use grab_loop::{GrabLoop, GrabLoopConfig, MAX_GRAB_INTERVAL, MIN_GRAB_INTERVAL, validate_interval};
pub use status::StatusSnapshot;

use trigger::ArmedTrigger;

/// Configuration for a Scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pause between attempts; rounds are paced at twice this.
    pub grab_interval: Duration,
    /// Failed attempts before a task is marked failed (`None`: retry forever).
    pub max_attempts: Option<u32>,
    /// How long `stop()` waits for the loop to wind down.
    pub stop_grace: Duration,
    /// How often an armed trigger checks the clock.
    pub trigger_poll: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            grab_interval: Duration::from_secs(1),
            max_attempts: None,
            stop_grace: Duration::from_secs(5),
            trigger_poll: Duration::from_secs(1),
        }
    }
}

impl SchedulerConfig {
    pub fn with_grab_interval(mut self, interval: Duration) -> Self {
        self.grab_interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn with_trigger_poll(mut self, poll: Duration) -> Self {
        self.trigger_poll = poll;
        self
    }
}

/// Handle to the running grab loop task.
///
/// Stays in place until the next run replaces it, so every `stop()` caller
/// can cancel and wait on the same run.
struct ActiveRun {
    cancel: CancellationToken,
    /// Flips to true once the task has cleared `running` and emitted its final status
    done: watch::Receiver<bool>,
}

struct Inner {
    queue: Arc<TaskQueue>,
    acquirer: Arc<dyn Acquirer>,
    events: EventSink,
    max_attempts: Option<u32>,
    stop_grace: Duration,
    trigger_poll: Duration,
    grab_interval: Mutex<Duration>,
    running: AtomicBool,
    active: Mutex<Option<ActiveRun>>,
    trigger: Mutex<Option<ArmedTrigger>>,
    generation: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    /// Shared start path for `start_immediate` and the trigger.
    fn start(self: &Arc<Self>) -> bool {
        let mut active = lock(&self.active);
        if self.running.load(Ordering::SeqCst) {
            self.events.log("Grab loop already running, ignoring start request");
            return false;
        }

        let pending = self.queue.pending().len();
        if pending == 0 {
            self.events.log("Queue is empty, nothing to grab");
            return true;
        }

        let config = GrabLoopConfig::new(*lock(&self.grab_interval)).with_max_attempts(self.max_attempts);
        let cancel = CancellationToken::new();
        let grab_loop = GrabLoop::new(
            self.queue.clone(),
            self.acquirer.clone(),
            self.events.clone(),
            config,
            cancel.clone(),
        );

        self.running.store(true, Ordering::SeqCst);
        self.events
            .log(format!("Starting grab loop with {} pending tasks", pending));
        self.events.status(RunStatus::Grabbing);

        let (done_tx, done) = watch::channel(false);
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = grab_loop.run().await;
            inner.running.store(false, Ordering::SeqCst);
            match outcome {
                GrabOutcome::Completed => inner.events.status(RunStatus::Completed),
                GrabOutcome::Stopped => inner.events.status(RunStatus::Stopped),
            }
            inner.events.log("Grab loop finished");
            let _ = done_tx.send(true);
        });

        *active = Some(ActiveRun { cancel, done });
        true
    }

    /// Start a run for the trigger of `generation`, if it is still the armed one.
    fn fire(self: &Arc<Self>, generation: u64, target: DateTime<FixedOffset>) -> bool {
        let mut trigger = lock(&self.trigger);
        if !matches!(&*trigger, Some(armed) if armed.generation == generation) {
            return false;
        }

        self.events.log(format!(
            "Scheduled time {} reached",
            target.format("%Y-%m-%d %H:%M:%S %:z")
        ));
        self.start();
        *trigger = None;
        true
    }
}

/// Schedules and supervises grab loop runs over one task queue.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("running", &self.is_running())
            .field("scheduled_at", &self.scheduled_at())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a scheduler. Fails if the configured grab interval is out of range.
    pub fn new(queue: Arc<TaskQueue>, acquirer: Arc<dyn Acquirer>, config: SchedulerConfig) -> Result<Self> {
        let grab_interval = validate_interval(config.grab_interval)?;

        Ok(Self {
            inner: Arc::new(Inner {
                queue,
                acquirer,
                events: EventSink::default(),
                max_attempts: config.max_attempts,
                stop_grace: config.stop_grace,
                trigger_poll: config.trigger_poll,
                grab_interval: Mutex::new(grab_interval),
                running: AtomicBool::new(false),
                active: Mutex::new(None),
                trigger: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        })
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.inner.queue
    }

    /// Get a receiver for log and status events
    pub fn subscribe(&self) -> broadcast::Receiver<GrabEvent> {
        self.inner.events.subscribe()
    }

    pub fn grab_interval(&self) -> Duration {
        *lock(&self.inner.grab_interval)
    }

    /// Change the pause between attempts. Applies from the next run on.
    pub fn set_grab_interval(&self, interval: Duration) -> Result<()> {
        *lock(&self.inner.grab_interval) = validate_interval(interval)?;
        Ok(())
    }

    /// Arm a one-shot trigger that starts a run at `target`.
    ///
    /// Replaces any trigger armed earlier. `target` must be strictly in the
    /// future; nothing is armed otherwise.
    pub fn schedule(&self, target: DateTime<FixedOffset>, grab_interval: Duration) -> Result<()> {
        let grab_interval = validate_interval(grab_interval)?;
        if target.with_timezone(&Utc) <= Utc::now() {
            return Err(GrabError::InvalidSchedule(format!(
                "{} is not in the future",
                target.format("%Y-%m-%d %H:%M:%S %:z")
            )));
        }

        *lock(&self.inner.grab_interval) = grab_interval;

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let previous = lock(&self.inner.trigger).replace(ArmedTrigger {
            generation,
            at: target,
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            log::debug!("Replacing trigger armed for {}", previous.at);
            previous.cancel.cancel();
        }

        tokio::spawn(trigger::run(
            Arc::downgrade(&self.inner),
            generation,
            target,
            self.inner.trigger_poll,
            cancel,
        ));

        self.inner.events.log(format!(
            "Grab scheduled for {}, interval {:.2}s",
            target.format("%Y-%m-%d %H:%M:%S %:z"),
            grab_interval.as_secs_f64()
        ));
        self.inner.events.status(RunStatus::Scheduled);
        Ok(())
    }

    /// Disarm the pending trigger. Returns false if none was armed.
    pub fn cancel_schedule(&self) -> bool {
        let Some(armed) = lock(&self.inner.trigger).take() else {
            return false;
        };
        armed.cancel.cancel();
        self.inner.events.log("Scheduled grab cancelled");
        true
    }

    /// Time of the armed trigger, if any
    pub fn scheduled_at(&self) -> Option<DateTime<FixedOffset>> {
        lock(&self.inner.trigger).as_ref().map(|armed| armed.at)
    }

    /// Start a run now.
    ///
    /// Returns false if a run is already in progress. Returns true otherwise,
    /// including when the queue has nothing pending and no run is started.
    pub fn start_immediate(&self) -> bool {
        self.inner.start()
    }

    /// Ask the running loop to stop and wait up to the grace period for it.
    ///
    /// Returns false if nothing was running. Returns true once the loop has
    /// exited or the grace period has passed, whichever comes first; an
    /// attempt in flight is never interrupted.
    pub async fn stop(&self) -> bool {
        let (cancel, mut done) = {
            let active = lock(&self.inner.active);
            match active.as_ref() {
                Some(run) if self.is_running() => (run.cancel.clone(), run.done.clone()),
                _ => return false,
            }
        };

        if !cancel.is_cancelled() {
            self.inner.events.log("Stop requested");
            cancel.cancel();
        }

        match tokio::time::timeout(self.inner.stop_grace, done.wait_for(|finished| *finished)).await {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => log::error!("Grab loop task ended without reporting completion"),
            Err(_) => {
                log::warn!(
                    "Grab loop still busy {:.1}s after stop request",
                    self.inner.stop_grace.as_secs_f64()
                );
            }
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot::new(
            self.is_running(),
            self.scheduled_at(),
            self.inner.queue.counts(),
            self.grab_interval(),
        )
    }
}
