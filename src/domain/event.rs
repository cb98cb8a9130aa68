//! Observer events emitted by the scheduler and grab loop.
//!
//! Events go out on a `tokio::sync::broadcast` channel. Sending never blocks:
//! a slow subscriber lags and skips events rather than stalling the loop, and
//! having no subscriber at all is fine.

use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;

/// Default capacity of the event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Coarse state of the scheduler as shown to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// A wall-clock trigger is armed
    Scheduled,
    /// A grab loop is attempting tasks
    Grabbing,
    /// The loop ended because no pending tasks remain
    Completed,
    /// The loop ended on cancellation
    Stopped,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Scheduled => "scheduled",
            RunStatus::Grabbing => "grabbing",
            RunStatus::Completed => "completed",
            RunStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Something an observer may want to display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrabEvent {
    /// Human-readable progress line
    Log(String),
    /// Status change
    Status(RunStatus),
}

/// Sending half of the event channel, mirrored to the `log` facade.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<GrabEvent>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Get a receiver for events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<GrabEvent> {
        self.tx.subscribe()
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        log::info!("{}", message);
        // Ignore send errors (no subscribers is fine)
        let _ = self.tx.send(GrabEvent::Log(message));
    }

    pub fn status(&self, status: RunStatus) {
        log::debug!("Status changed: {}", status);
        let _ = self.tx.send(GrabEvent::Status(status));
    }
}
