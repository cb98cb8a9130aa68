//! Acquisition collaborator - the one call the grab loop makes per task.
//!
//! This module provides:
//! - `Acquirer` trait for attempting to take one seat
//! - `CommandAcquirer`, which delegates each attempt to a shell command
//! - `MockAcquirer`, a scripted acquirer for tests

pub mod command;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Resource;

pub use command::{CommandAcquirer, CommandAcquirerConfig};
pub use mock::{MockAcquirer, MockReply};

/// Result of a completed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// The seat is ours
    Acquired,
    /// The backend answered but said no (full, outside the window, ...)
    Rejected { reason: String },
}

impl Attempt {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Attempt::Rejected { reason: reason.into() }
    }
}

/// Errors raised while attempting an acquisition
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("{0}")]
    Other(String),
}

/// Attempts to acquire one resource.
///
/// Implementations are expected to bound each call with their own timeout;
/// the grab loop adds none and never interrupts a call in flight.
#[async_trait]
pub trait Acquirer: Send + Sync {
    async fn attempt(&self, resource: &Resource) -> Result<Attempt, AcquireError>;
}
