//! Core rate limiter facade.

use std::sync::Arc;
use tracing::{debug, trace};

use super::algorithm::{Algorithm, Strategy};
use super::decision::Decision;
use super::locks::KeyLocks;
use super::quota::Quota;
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, TurnstileError};
use crate::storage::{MemoryStorage, Storage};

/// The admission engine: one algorithm, one quota, one storage.
///
/// This struct is thread-safe and can be shared across threads behind an
/// `Arc`. All per-identity state lives in the storage; the limiter itself only
/// holds the striped locks that serialize read-then-write algorithms.
pub struct RateLimiter {
    algorithm: Algorithm,
    quota: Quota,
    strategy: Strategy,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    locks: KeyLocks,
}

impl RateLimiter {
    /// Create a rate limiter on the system clock.
    pub fn new(algorithm: Algorithm, quota: Quota, storage: Arc<dyn Storage>) -> Result<Self> {
        Self::with_clock(algorithm, quota, storage, Arc::new(SystemClock))
    }

    /// Create a rate limiter reading time from `clock`.
    ///
    /// `clock` should be the same clock the storage expires keys by.
    pub fn with_clock(
        algorithm: Algorithm,
        quota: Quota,
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if algorithm.needs_lists() && storage.lists().is_none() {
            return Err(TurnstileError::Config(format!(
                "{} requires a storage backend with list support",
                algorithm
            )));
        }

        debug!(
            algorithm = %algorithm,
            max_admissions = quota.max_admissions(),
            window_secs = quota.window_secs(),
            "Rate limiter initialized"
        );

        Ok(Self {
            algorithm,
            quota,
            strategy: Strategy::new(algorithm, quota),
            storage,
            clock,
            locks: KeyLocks::new(),
        })
    }

    /// Create a rate limiter from an algorithm name.
    ///
    /// Fails with a configuration error if the name is not one of
    /// [`Algorithm::ALL`].
    pub fn from_name(name: &str, quota: Quota, storage: Arc<dyn Storage>) -> Result<Self> {
        Self::new(name.parse()?, quota, storage)
    }

    /// Start building a rate limiter with default settings.
    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::default()
    }

    /// Decide whether `identity` may proceed now, recording the call if so.
    ///
    /// A denial is a normal `Ok` result with `admitted == false`. Storage
    /// failures are returned as errors, never treated as either outcome.
    pub fn allow(&self, identity: &str) -> Result<Decision> {
        trace!(
            identity = %identity,
            algorithm = %self.algorithm,
            "Checking rate limit"
        );

        let decision = if self.algorithm.needs_key_lock() {
            let _guard = self.locks.lock(identity);
            self.strategy
                .allow(self.storage.as_ref(), identity, self.clock.now())?
        } else {
            self.strategy
                .allow(self.storage.as_ref(), identity, self.clock.now())?
        };

        if !decision.admitted {
            debug!(
                identity = %identity,
                algorithm = %self.algorithm,
                retry_after = ?decision.retry_after,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }

    /// The algorithm this limiter runs.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The quota this limiter enforces.
    pub fn quota(&self) -> Quota {
        self.quota
    }

    /// The storage backing this limiter.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// The clock this limiter reads.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("algorithm", &self.algorithm)
            .field("quota", &self.quota)
            .field("clock", &self.clock)
            .finish()
    }
}

/// Builder for [`RateLimiter`].
///
/// Defaults to the sliding window counter, 100 admissions per minute, the
/// system clock, and a fresh [`MemoryStorage`] on that clock.
#[derive(Default)]
pub struct RateLimiterBuilder {
    algorithm: Algorithm,
    quota: Quota,
    storage: Option<Arc<dyn Storage>>,
    clock: Option<Arc<dyn Clock>>,
}

impl RateLimiterBuilder {
    /// Set the algorithm.
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the quota.
    pub fn quota(mut self, quota: Quota) -> Self {
        self.quota = quota;
        self
    }

    /// Use an existing storage backend.
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Read time from `clock`. A default in-memory store uses it too.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the limiter.
    pub fn build(self) -> Result<RateLimiter> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::with_clock(clock.clone())));
        RateLimiter::with_clock(self.algorithm, self.quota, storage, clock)
    }
}
