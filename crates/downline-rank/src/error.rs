//! Error types for the rank engine.

use crate::models::UserId;
use thiserror::Error;

/// Result type for rank engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in rank engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The record or cache store failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Stored data could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No record exists for the user
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// A store failure interrupted an upline walk after some ranks were written.
    #[error("Propagation stopped at {at} after {} update(s): {source}", .applied.len())]
    Propagation {
        at: UserId,
        applied: Vec<UserId>,
        #[source]
        source: Box<Error>,
    },

    /// Invalid configuration value
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error reports a missing user rather than a store failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::UserNotFound(_))
    }
}
