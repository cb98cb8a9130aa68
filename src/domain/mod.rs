//! Domain types for seatgrab
//!
//! - Task: `GrabTask`, its `TaskStatus`, and the `Resource` it targets
//! - Event: observer events (`GrabEvent`) and the `EventSink` that emits them
//! - Outcome: how a grab loop run ended

pub mod event;
pub mod outcome;
pub mod task;

pub use event::{EVENT_CHANNEL_CAPACITY, EventSink, GrabEvent, RunStatus};
pub use outcome::GrabOutcome;
pub use task::{GrabTask, Resource, ResourceId, TaskStatus};
