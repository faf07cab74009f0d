//! Quota configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TurnstileError};

/// Default number of admissions per window.
const DEFAULT_MAX_ADMISSIONS: u64 = 100;
/// Default window length in seconds.
const DEFAULT_WINDOW_SECS: f64 = 60.0;

/// How many admissions are allowed over what window.
///
/// Both fields are strictly positive; construction fails otherwise. A quota is
/// immutable and shared read-only by every call on a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawQuota", into = "RawQuota")]
pub struct Quota {
    max_admissions: u64,
    window: Duration,
}

impl Quota {
    /// Create a quota of `max_admissions` per `window`.
    pub fn new(max_admissions: u64, window: Duration) -> Result<Self> {
        if max_admissions == 0 {
            return Err(TurnstileError::Config(
                "max_admissions must be positive".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(TurnstileError::Config(
                "window_seconds must be positive".to_string(),
            ));
        }
        Ok(Self {
            max_admissions,
            window,
        })
    }

    /// Create a quota from a window length in fractional seconds.
    pub fn from_secs(max_admissions: u64, window_seconds: f64) -> Result<Self> {
        if !window_seconds.is_finite() || window_seconds <= 0.0 {
            return Err(TurnstileError::Config(format!(
                "window_seconds must be positive, got {}",
                window_seconds
            )));
        }
        let window = Duration::try_from_secs_f64(window_seconds).map_err(|e| {
            TurnstileError::Config(format!("window_seconds {} is out of range: {}", window_seconds, e))
        })?;
        Self::new(max_admissions, window)
    }

    /// `max_admissions` per second.
    pub fn per_second(max_admissions: u64) -> Result<Self> {
        Self::new(max_admissions, Duration::from_secs(1))
    }

    /// `max_admissions` per minute.
    pub fn per_minute(max_admissions: u64) -> Result<Self> {
        Self::new(max_admissions, Duration::from_secs(60))
    }

    /// `max_admissions` per hour.
    pub fn per_hour(max_admissions: u64) -> Result<Self> {
        Self::new(max_admissions, Duration::from_secs(3600))
    }

    /// Maximum admissions per window.
    pub fn max_admissions(&self) -> u64 {
        self.max_admissions
    }

    /// The window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// The window length in seconds.
    pub fn window_secs(&self) -> f64 {
        self.window.as_secs_f64()
    }

    /// Continuous refill rate in admissions per second.
    pub fn rate_per_sec(&self) -> f64 {
        self.max_admissions as f64 / self.window_secs()
    }

    /// Index of the fixed window containing `now`.
    pub(crate) fn window_index(&self, now: f64) -> i64 {
        (now / self.window_secs()).floor() as i64
    }

    /// Start time of the fixed window with the given index.
    pub(crate) fn window_start(&self, index: i64) -> f64 {
        index as f64 * self.window_secs()
    }
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            max_admissions: DEFAULT_MAX_ADMISSIONS,
            window: Duration::from_secs_f64(DEFAULT_WINDOW_SECS),
        }
    }
}

/// Wire shape of a quota in configuration files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawQuota {
    max_admissions: u64,
    window_seconds: f64,
}

impl TryFrom<RawQuota> for Quota {
    type Error = TurnstileError;

    fn try_from(raw: RawQuota) -> Result<Self> {
        Quota::from_secs(raw.max_admissions, raw.window_seconds)
    }
}

impl From<Quota> for RawQuota {
    fn from(quota: Quota) -> Self {
        Self {
            max_admissions: quota.max_admissions,
            window_seconds: quota.window_secs(),
        }
    }
}
