//! Error types for seatgrab
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in seatgrab
#[derive(Debug, Error)]
pub enum GrabError {
    /// Scheduled start time is not in the future
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Grab interval outside the accepted range
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for seatgrab operations
pub type Result<T> = std::result::Result<T, GrabError>;
