//! seatgrab - scheduled course seat grabbing
//!
//! seatgrab keeps a persisted, priority-ordered queue of seats to grab and
//! runs a cancellable loop that attempts them in order, paced to respect the
//! backend's rate limits, either right away or at a chosen wall-clock time.

pub mod acquire;
pub mod catalog;
pub mod domain;
pub mod error;
pub mod queue;
pub mod scheduler;
pub mod storage;

pub use error::{GrabError, Result};
