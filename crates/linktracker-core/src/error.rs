//! Error type shared by every LinkTracker crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkTrackerError {
    /// Subscriber, link or subscription is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed URL, missing draft field, bad input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Duplicate subscription or already-existing record.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A remote source check failed.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Storage I/O failure.
    #[error("Storage error: {0}")]
    Transient(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LinkTrackerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LinkTrackerError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, LinkTrackerError::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, LinkTrackerError>;
