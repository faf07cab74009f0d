//! Token bucket admission.

use tracing::trace;

use super::decision::Decision;
use super::quota::Quota;
use crate::error::Result;
use crate::storage::Storage;

/// Stored values are fixed-point with this many units per whole value.
const MICROS: f64 = 1_000_000.0;

fn to_micros(value: f64) -> i64 {
    (value * MICROS).round() as i64
}

fn from_micros(value: i64) -> f64 {
    value as f64 / MICROS
}

/// Continuous-refill bucket of capacity `max_admissions`.
///
/// Each admitted call drains one token; tokens come back at
/// `max_admissions / window` per second, capped at capacity. Bursts up to the
/// full capacity are allowed and the long-run rate is exactly the quota.
///
/// State is two counters per identity, the token count and the last refill
/// time, both stored in millionths so they fit the integer counter contract.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    quota: Quota,
}

impl TokenBucket {
    pub fn new(quota: Quota) -> Self {
        Self { quota }
    }

    fn keys(identity: &str) -> (String, String) {
        (format!("tb:tokens:{}", identity), format!("tb:last:{}", identity))
    }

    /// Check and record one call for `identity` at time `now`.
    ///
    /// Not synchronized: callers must serialize calls for the same identity.
    pub fn allow(&self, storage: &dyn Storage, identity: &str, now: f64) -> Result<Decision> {
        let (tokens_key, last_key) = Self::keys(identity);
        let capacity = self.quota.max_admissions() as f64;
        let rate = self.quota.rate_per_sec();

        let (tokens, last_refill) = match (storage.get(&tokens_key)?, storage.get(&last_key)?) {
            (Some(tokens), Some(last)) => (from_micros(tokens), from_micros(last)),
            _ => (capacity, now),
        };

        let elapsed = (now - last_refill).max(0.0);
        let mut tokens = (tokens + elapsed * rate).min(capacity);

        let retry_after = if tokens >= 1.0 {
            tokens -= 1.0;
            None
        } else {
            Some((1.0 - tokens) / rate)
        };

        // Outlive one window so a lull doesn't drop fractional tokens.
        let ttl = self.quota.window().saturating_mul(2);
        storage.set(&tokens_key, to_micros(tokens), ttl)?;
        storage.set(&last_key, to_micros(now), ttl)?;

        let reset_at = now + (capacity - tokens) / rate;
        let remaining = tokens.floor() as u64;

        trace!(identity, tokens, "Token bucket updated");

        Ok(match retry_after {
            None => Decision::admit(remaining, reset_at),
            Some(wait) => Decision::deny(remaining, reset_at, wait),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::storage::MemoryStorage;
    use std::sync::Arc;
    use std::time::Duration;

    fn setup(max: u64, window: f64) -> (Arc<ManualClock>, MemoryStorage, TokenBucket) {
        let clock = Arc::new(ManualClock::starting_at(1_000.0));
        let storage = MemoryStorage::with_clock(clock.clone());
        let bucket = TokenBucket::new(Quota::from_secs(max, window).unwrap());
        (clock, storage, bucket)
    }

    #[test]
    fn test_allows_full_burst_then_denies() {
        let (clock, storage, bucket) = setup(5, 10.0);
        let now = clock.now();

        for i in 0..5 {
            let decision = bucket.allow(&storage, "user", now).unwrap();
            assert!(decision.admitted, "call {} should be admitted", i + 1);
            assert_eq!(decision.remaining, 4 - i);
        }

        let decision = bucket.allow(&storage, "user", now).unwrap();
        assert!(!decision.admitted);
        assert_eq!(decision.remaining, 0);
        // One token at 0.5 tokens/sec
        assert_eq!(decision.retry_after, Some(Duration::from_secs(2)));
        // Empty bucket refills completely in 10 seconds
        assert_eq!(decision.reset_at, now + 10.0);
    }

    #[test]
    fn test_refill_admits_at_most_elapsed_times_rate() {
        let (clock, storage, bucket) = setup(10, 10.0);

        for _ in 0..10 {
            assert!(bucket.allow(&storage, "user", clock.now()).unwrap().admitted);
        }
        assert!(!bucket.allow(&storage, "user", clock.now()).unwrap().admitted);

        // 3.5 seconds at 1 token/sec refills 3.5 tokens
        clock.advance(Duration::from_millis(3500));
        let admitted = (0..10)
            .filter(|_| bucket.allow(&storage, "user", clock.now()).unwrap().admitted)
            .count();
        assert_eq!(admitted, 3);
    }

    #[test]
    fn test_refill_is_capped_at_capacity() {
        let (clock, storage, bucket) = setup(3, 3.0);

        assert!(bucket.allow(&storage, "user", clock.now()).unwrap().admitted);
        clock.advance(Duration::from_secs(5));

        let admitted = (0..10)
            .filter(|_| bucket.allow(&storage, "user", clock.now()).unwrap().admitted)
            .count();
        assert_eq!(admitted, 3);
    }

    #[test]
    fn test_partial_token_retry_after() {
        let (clock, storage, bucket) = setup(2, 2.0);

        bucket.allow(&storage, "user", clock.now()).unwrap();
        bucket.allow(&storage, "user", clock.now()).unwrap();
        clock.advance(Duration::from_millis(250));

        let decision = bucket.allow(&storage, "user", clock.now()).unwrap();
        assert!(!decision.admitted);
        let wait = decision.retry_after_secs().unwrap();
        assert!((wait - 0.75).abs() < 1e-6, "wait was {}", wait);
    }

    #[test]
    fn test_state_expires_after_two_windows() {
        let (clock, storage, bucket) = setup(1, 1.0);

        bucket.allow(&storage, "user", clock.now()).unwrap();
        assert!(storage.get("tb:tokens:user").unwrap().is_some());

        clock.advance(Duration::from_secs(2));
        assert!(storage.get("tb:tokens:user").unwrap().is_none());
        assert!(bucket.allow(&storage, "user", clock.now()).unwrap().admitted);
    }

    #[test]
    fn test_huge_window_does_not_overflow_ttl() {
        let clock = Arc::new(ManualClock::starting_at(1_000.0));
        let storage = MemoryStorage::with_clock(clock.clone());
        let quota = Quota::new(1, Duration::from_secs(u64::MAX / 2 + 1)).unwrap();
        let bucket = TokenBucket::new(quota);

        assert!(bucket.allow(&storage, "user", clock.now()).unwrap().admitted);
        assert!(!bucket.allow(&storage, "user", clock.now()).unwrap().admitted);
    }
}
