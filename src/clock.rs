//! Time sources shared by the limiter and its storage.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

/// Source of the current time in fractional seconds.
///
/// Every algorithm and the in-memory stores read time through this trait, so a
/// limiter and its storage must share one clock.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time in seconds.
    fn now(&self) -> f64;
}

/// Wall-clock time in seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }
}

/// A clock that only moves when told to.
///
/// Starts at zero unless constructed with [`ManualClock::starting_at`].
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    /// Create a clock reading `0.0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock reading `secs`.
    pub fn starting_at(secs: f64) -> Self {
        Self {
            now: Mutex::new(secs),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, secs: f64) {
        *self.now.lock() = secs;
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by.as_secs_f64();
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("now", &*self.now.lock())
            .finish()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_moves_only_when_told() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), 0.0);

        clock.advance(Duration::from_millis(1500));
        assert_eq!(clock.now(), 1.5);

        clock.set(10.0);
        assert_eq!(clock.now(), 10.0);
    }

    #[test]
    fn test_system_clock_is_epoch_seconds() {
        let now = SystemClock.now();
        // 2020-01-01T00:00:00Z
        assert!(now > 1_577_836_800.0);
    }
}
