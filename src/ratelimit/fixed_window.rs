//! Fixed window counter admission.

use super::decision::Decision;
use super::quota::Quota;
use crate::error::Result;
use crate::storage::Storage;

/// Counts calls in consecutive, non-overlapping windows.
///
/// Window `i` covers `[i * window, (i + 1) * window)` and has its own counter.
/// Up to `2 * max_admissions` calls can get through around a window boundary
/// (the tail of one window plus the head of the next); that is the price of a
/// single atomic increment per call.
#[derive(Debug, Clone)]
pub struct FixedWindow {
    quota: Quota,
}

impl FixedWindow {
    pub fn new(quota: Quota) -> Self {
        Self { quota }
    }

    /// Check and record one call for `identity` at time `now`.
    ///
    /// Safe to call concurrently: the only mutation is the storage's atomic
    /// increment.
    pub fn allow(&self, storage: &dyn Storage, identity: &str, now: f64) -> Result<Decision> {
        let index = self.quota.window_index(now);
        let key = format!("fw:{}:{}", identity, index);

        let count = storage.increment(&key, self.quota.window())?.max(0) as u64;
        let max = self.quota.max_admissions();
        let next_window = self.quota.window_start(index + 1);

        if count <= max {
            Ok(Decision::admit(max - count, next_window))
        } else {
            Ok(Decision::deny(0, next_window, next_window - now))
        }
    }
}
