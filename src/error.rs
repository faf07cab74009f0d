//! Error types for the Turnstile engine.

use thiserror::Error;

use crate::ratelimit::Decision;
use crate::storage::StorageError;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors (invalid quota, unknown algorithm, bad config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A wrapped call was denied admission
    #[error(
        "Rate limit exceeded. Retry after {:.2} seconds",
        .0.retry_after_secs().unwrap_or_default()
    )]
    RateLimited(Decision),

    /// Storage backend errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TurnstileError {
    /// The denied decision, if this error is a rate limit rejection.
    pub fn decision(&self) -> Option<&Decision> {
        match self {
            TurnstileError::RateLimited(decision) => Some(decision),
            _ => None,
        }
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
