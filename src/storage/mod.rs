//! Storage contract for rate limit state.
//!
//! Algorithms only talk to storage through these traits, so the same algorithm
//! code runs against the in-process stores here or against a shared external
//! store in a multi-instance deployment. Counter operations live in
//! [`Storage`]; the ordered event-log operations used by the sliding window
//! log live in [`ListStorage`], so a backend with no native list type can still
//! serve the three counter-based algorithms.

mod memory;
mod sharded;

pub use memory::MemoryStorage;
pub use sharded::ShardedMemoryStorage;

use std::time::Duration;
use thiserror::Error;

/// Errors a storage backend can report.
///
/// The engine never retries or masks these; they reach the caller of
/// `allow` unmodified.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend could not be reached
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A key holds a value of the other kind (counter vs. list)
    #[error("key '{key}' does not hold a {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
    },

    /// Any other backend failure
    #[error(transparent)]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Counter operations every algorithm depends on.
///
/// Implementations must make each operation atomic per key. Expired keys must
/// read as absent. No ordering across keys is required.
pub trait Storage: Send + Sync {
    /// Increase a counter by one, creating it at 1 if absent, and reset its
    /// expiry to `ttl` from now. Returns the post-increment value.
    fn increment(&self, key: &str, ttl: Duration) -> Result<i64, StorageError>;

    /// Read a counter.
    fn get(&self, key: &str) -> Result<Option<i64>, StorageError>;

    /// Overwrite a counter's value and expiry.
    fn set(&self, key: &str, value: i64, ttl: Duration) -> Result<(), StorageError>;

    /// Remove a key immediately.
    fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// The list capability of this backend, if it has one.
    fn lists(&self) -> Option<&dyn ListStorage> {
        None
    }
}

/// Ordered event-log operations, used by the sliding window log.
pub trait ListStorage: Storage {
    /// Read the logged timestamps for a key, oldest first. Empty if absent.
    fn get_list(&self, key: &str) -> Result<Vec<f64>, StorageError>;

    /// Append a timestamp and extend the key's expiry to `ttl` from now.
    fn add_to_list(&self, key: &str, value: f64, ttl: Duration) -> Result<(), StorageError>;

    /// Drop every timestamp `<= cutoff`.
    fn cleanup_list(&self, key: &str, cutoff: f64) -> Result<(), StorageError>;
}
