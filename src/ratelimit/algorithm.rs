//! The closed set of admission algorithms.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::decision::Decision;
use super::fixed_window::FixedWindow;
use super::quota::Quota;
use super::sliding_counter::SlidingWindowCounter;
use super::sliding_log::SlidingWindowLog;
use super::token_bucket::TokenBucket;
use crate::error::{Result, TurnstileError};
use crate::storage::{Storage, StorageError};

/// Which admission algorithm a limiter runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Continuous refill, bursts up to capacity
    TokenBucket,
    /// Independent counters per fixed window
    FixedWindow,
    /// Exact log of admissions in the trailing window
    SlidingWindowLog,
    /// Weighted blend of the current and previous fixed windows
    #[default]
    SlidingWindowCounter,
}

impl Algorithm {
    /// Every algorithm, in lookup order.
    pub const ALL: [Algorithm; 4] = [
        Algorithm::TokenBucket,
        Algorithm::FixedWindow,
        Algorithm::SlidingWindowLog,
        Algorithm::SlidingWindowCounter,
    ];

    /// The configuration name of this algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::TokenBucket => "token_bucket",
            Algorithm::FixedWindow => "fixed_window",
            Algorithm::SlidingWindowLog => "sliding_window_log",
            Algorithm::SlidingWindowCounter => "sliding_window_counter",
        }
    }

    /// Whether the algorithm needs list support from its storage.
    pub fn needs_lists(&self) -> bool {
        matches!(self, Algorithm::SlidingWindowLog)
    }

    /// Whether one decision is a read followed by a dependent write, and so
    /// must be serialized per identity.
    pub(crate) fn needs_key_lock(&self) -> bool {
        !matches!(self, Algorithm::FixedWindow)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = TurnstileError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|algorithm| algorithm.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(Algorithm::name).collect();
                TurnstileError::Config(format!(
                    "Unknown algorithm: {}. Choose from: {}",
                    s,
                    names.join(", ")
                ))
            })
    }
}

/// An algorithm bound to its quota.
#[derive(Debug, Clone)]
pub(crate) enum Strategy {
    TokenBucket(TokenBucket),
    FixedWindow(FixedWindow),
    SlidingWindowLog(SlidingWindowLog),
    SlidingWindowCounter(SlidingWindowCounter),
}

impl Strategy {
    pub(crate) fn new(algorithm: Algorithm, quota: Quota) -> Self {
        match algorithm {
            Algorithm::TokenBucket => Strategy::TokenBucket(TokenBucket::new(quota)),
            Algorithm::FixedWindow => Strategy::FixedWindow(FixedWindow::new(quota)),
            Algorithm::SlidingWindowLog => Strategy::SlidingWindowLog(SlidingWindowLog::new(quota)),
            Algorithm::SlidingWindowCounter => {
                Strategy::SlidingWindowCounter(SlidingWindowCounter::new(quota))
            }
        }
    }

    pub(crate) fn allow(&self, storage: &dyn Storage, identity: &str, now: f64) -> Result<Decision> {
        match self {
            Strategy::TokenBucket(bucket) => bucket.allow(storage, identity, now),
            Strategy::FixedWindow(window) => window.allow(storage, identity, now),
            Strategy::SlidingWindowLog(log) => {
                let lists = storage.lists().ok_or_else(|| {
                    StorageError::Unavailable("storage has no list support".to_string())
                })?;
                log.allow(lists, identity, now)
            }
            Strategy::SlidingWindowCounter(counter) => counter.allow(storage, identity, now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_through_lookup() {
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.name().parse::<Algorithm>().unwrap(), algorithm);
            assert_eq!(algorithm.to_string(), algorithm.name());
        }
    }

    #[test]
    fn test_unknown_name_is_a_config_error() {
        let err = "leaky_bucket".parse::<Algorithm>().unwrap_err();
        assert!(matches!(err, TurnstileError::Config(_)));
        assert!(err.to_string().contains("leaky_bucket"));
        assert!(err.to_string().contains("sliding_window_counter"));
    }

    #[test]
    fn test_default_is_sliding_window_counter() {
        assert_eq!(Algorithm::default(), Algorithm::SlidingWindowCounter);
    }

    #[test]
    fn test_serde_uses_snake_case_names() {
        let algorithm: Algorithm = serde_yaml::from_str("sliding_window_log").unwrap();
        assert_eq!(algorithm, Algorithm::SlidingWindowLog);
        assert_eq!(
            serde_json::to_string(&Algorithm::TokenBucket).unwrap(),
            "\"token_bucket\""
        );
    }
}
