//! Grab loop outcome types.

/// How a grab loop run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabOutcome {
    /// No pending tasks remain
    Completed,
    /// Cancellation was observed at a suspension point
    Stopped,
}
