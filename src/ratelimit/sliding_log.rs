//! Sliding window log admission.

use super::decision::Decision;
use super::quota::Quota;
use crate::error::Result;
use crate::storage::ListStorage;

/// Keeps the timestamp of every admitted call in the trailing window.
///
/// Exact: there is no boundary burst. Memory per identity grows with
/// `max_admissions`.
#[derive(Debug, Clone)]
pub struct SlidingWindowLog {
    quota: Quota,
}

impl SlidingWindowLog {
    pub fn new(quota: Quota) -> Self {
        Self { quota }
    }

    /// Check and record one call for `identity` at time `now`.
    ///
    /// Not synchronized: callers must serialize calls for the same identity.
    pub fn allow(&self, storage: &dyn ListStorage, identity: &str, now: f64) -> Result<Decision> {
        let key = format!("swl:{}", identity);
        let window = self.quota.window_secs();
        let max = self.quota.max_admissions();
        let reset_at = now + window;

        storage.cleanup_list(&key, now - window)?;
        let log = storage.get_list(&key)?;
        let count = log.len() as u64;

        if count < max {
            storage.add_to_list(&key, now, self.quota.window())?;
            Ok(Decision::admit(max - count - 1, reset_at))
        } else {
            let oldest = log.iter().copied().fold(now, f64::min);
            Ok(Decision::deny(0, reset_at, oldest + window - now))
        }
    }
}
