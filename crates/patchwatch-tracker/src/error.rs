//! Tracker-level error types

use thiserror::Error;

use crate::repository::StorageError;

/// Result type alias for tracker operations
pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Polling is already running")]
    AlreadyPolling,

    #[error("Configuration error: {0}")]
    Config(String),
}
