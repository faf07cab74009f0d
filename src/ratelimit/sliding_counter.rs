//! Sliding window counter admission.

use super::decision::Decision;
use super::quota::Quota;
use crate::error::Result;
use crate::storage::Storage;

/// Approximates a sliding log with two fixed-window counters.
///
/// The previous window's count is weighted by the share of the current window
/// that has not elapsed yet, as if its calls were spread evenly. Memory is two
/// counters per identity. Any one fixed window still admits at most
/// `max_admissions`, so any trailing interval of one window admits at most
/// twice that; in practice the overshoot is far smaller than a plain fixed
/// window's.
#[derive(Debug, Clone)]
pub struct SlidingWindowCounter {
    quota: Quota,
}

impl SlidingWindowCounter {
    pub fn new(quota: Quota) -> Self {
        Self { quota }
    }

    /// Check and record one call for `identity` at time `now`.
    ///
    /// Not synchronized: callers must serialize calls for the same identity.
    pub fn allow(&self, storage: &dyn Storage, identity: &str, now: f64) -> Result<Decision> {
        let window = self.quota.window_secs();
        let max = self.quota.max_admissions() as f64;

        let index = self.quota.window_index(now);
        let window_start = self.quota.window_start(index);
        let current_key = format!("swc:{}:{}", identity, index);
        let previous_key = format!("swc:{}:{}", identity, index - 1);

        let current = storage.get(&current_key)?.unwrap_or(0) as f64;
        let previous = storage.get(&previous_key)?.unwrap_or(0) as f64;

        let elapsed = ((now - window_start) / window).clamp(0.0, 1.0);
        let weighted = previous * (1.0 - elapsed) + current;
        let reset_at = window_start + window;

        if weighted < max {
            storage.increment(&current_key, self.quota.window().saturating_mul(2))?;
            let remaining = (max - weighted - 1.0).floor().max(0.0) as u64;
            Ok(Decision::admit(remaining, reset_at))
        } else {
            Ok(Decision::deny(0, reset_at, (1.0 - elapsed) * window))
        }
    }
}
