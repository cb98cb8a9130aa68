//! One-shot wall-clock trigger.
//!
//! The trigger task polls the clock at a low, fixed rate (1 Hz by default)
//! rather than sleeping until the target, so it keeps working across system
//! suspend and clock adjustments. It holds only a weak reference to the
//! scheduler: dropping every scheduler handle lets an armed trigger die at
//! its next tick.

use std::sync::Weak;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::Inner;

/// Bookkeeping for the currently armed trigger
pub(super) struct ArmedTrigger {
    pub(super) generation: u64,
    pub(super) at: DateTime<FixedOffset>,
    pub(super) cancel: CancellationToken,
}

/// Wait until `target`, then start the grab loop unless cancelled first.
pub(super) async fn run(
    inner: Weak<Inner>,
    generation: u64,
    target: DateTime<FixedOffset>,
    poll: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        if Utc::now() >= target.with_timezone(&Utc) {
            break;
        }
        if inner.strong_count() == 0 {
            return;
        }
    }

    if let Some(inner) = inner.upgrade() {
        inner.fire(generation, target);
    }
}
