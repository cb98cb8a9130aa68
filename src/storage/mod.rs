//! Storage layer for seatgrab - JSON snapshot persistence for the task queue.

mod snapshot;

pub use snapshot::{QueueSnapshot, SnapshotStore, TaskRecord};
