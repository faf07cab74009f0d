//! Sharded in-memory storage backed by `DashMap`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;

use super::memory::{expiry, Entry, SWEEP_INTERVAL};
use super::{ListStorage, Storage, StorageError};
use crate::clock::{Clock, SystemClock};

/// In-memory storage that locks per shard instead of globally.
///
/// Same semantics as [`MemoryStorage`](super::MemoryStorage), but keys for
/// different identities usually land on different shards, so busy identities
/// don't serialize each other. Each operation holds its shard's write lock for
/// the whole read-modify-write, which keeps it atomic per key.
pub struct ShardedMemoryStorage {
    entries: DashMap<String, Entry>,
    ops_since_sweep: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl ShardedMemoryStorage {
    /// Create an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ops_since_sweep: AtomicU64::new(0),
            clock,
        }
    }

    /// Remove every expired key now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        self.ops_since_sweep.store(0, Ordering::Relaxed);
        before.saturating_sub(self.entries.len())
    }

    /// Number of keys currently held, including any not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn now(&self) -> f64 {
        if self.ops_since_sweep.fetch_add(1, Ordering::Relaxed) + 1 >= SWEEP_INTERVAL {
            self.purge_expired();
        }
        self.clock.now()
    }
}

impl Default for ShardedMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for ShardedMemoryStorage {
    fn increment(&self, key: &str, ttl: Duration) -> Result<i64, StorageError> {
        let now = self.now();
        let expires_at = expiry(now, ttl);

        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                let count = if occupied.get().is_expired(now) {
                    1
                } else {
                    occupied.get().as_counter(key)? + 1
                };
                occupied.insert(Entry::counter(count, expires_at));
                Ok(count)
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::counter(1, expires_at));
                Ok(1)
            }
        }
    }

    fn get(&self, key: &str) -> Result<Option<i64>, StorageError> {
        let now = self.now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => entry.as_counter(key).map(Some),
            _ => Ok(None),
        }
    }

    fn set(&self, key: &str, value: i64, ttl: Duration) -> Result<(), StorageError> {
        let now = self.now();
        self.entries
            .insert(key.to_string(), Entry::counter(value, expiry(now, ttl)));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    fn lists(&self) -> Option<&dyn ListStorage> {
        Some(self)
    }
}

impl ListStorage for ShardedMemoryStorage {
    fn get_list(&self, key: &str) -> Result<Vec<f64>, StorageError> {
        let now = self.now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                Ok(entry.as_list(key)?.iter().copied().collect())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn add_to_list(&self, key: &str, value: f64, ttl: Duration) -> Result<(), StorageError> {
        let now = self.now();
        let expires_at = expiry(now, ttl);

        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) if occupied.get().is_expired(now) => {
                occupied.insert(Entry::list(value, expires_at));
            }
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.list_mut(key)?.push_back(value);
                entry.expires_at = expires_at;
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::list(value, expires_at));
            }
        }
        Ok(())
    }

    fn cleanup_list(&self, key: &str, cutoff: f64) -> Result<(), StorageError> {
        let now = self.now();
        if let MapEntry::Occupied(mut occupied) = self.entries.entry(key.to_string()) {
            if occupied.get().is_expired(now) {
                occupied.remove();
                return Ok(());
            }
            let list = occupied.get_mut().list_mut(key)?;
            list.retain(|t| *t > cutoff);
            if list.is_empty() {
                occupied.remove();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_counter_lifecycle() {
        let clock = Arc::new(ManualClock::new());
        let storage = ShardedMemoryStorage::with_clock(clock.clone());
        let ttl = Duration::from_secs(2);

        assert_eq!(storage.increment("k", ttl).unwrap(), 1);
        assert_eq!(storage.increment("k", ttl).unwrap(), 2);
        assert_eq!(storage.get("k").unwrap(), Some(2));

        clock.advance(Duration::from_secs(2));
        assert_eq!(storage.get("k").unwrap(), None);
        assert_eq!(storage.increment("k", ttl).unwrap(), 1);

        storage.delete("k").unwrap();
        assert_eq!(storage.get("k").unwrap(), None);
    }

    #[test]
    fn test_list_lifecycle() {
        let clock = Arc::new(ManualClock::new());
        let storage = ShardedMemoryStorage::with_clock(clock.clone());
        let ttl = Duration::from_secs(10);

        storage.add_to_list("log", 1.0, ttl).unwrap();
        storage.add_to_list("log", 2.0, ttl).unwrap();
        storage.add_to_list("log", 3.0, ttl).unwrap();
        storage.cleanup_list("log", 1.0).unwrap();
        assert_eq!(storage.get_list("log").unwrap(), vec![2.0, 3.0]);

        clock.advance(Duration::from_secs(10));
        assert!(storage.get_list("log").unwrap().is_empty());
        assert_eq!(storage.purge_expired(), 1);
    }

    #[test]
    fn test_add_to_expired_list_starts_fresh() {
        let clock = Arc::new(ManualClock::new());
        let storage = ShardedMemoryStorage::with_clock(clock.clone());

        storage.add_to_list("log", 1.0, Duration::from_secs(5)).unwrap();
        storage.add_to_list("log", 2.0, Duration::from_secs(5)).unwrap();
        clock.advance(Duration::from_secs(5));

        storage.add_to_list("log", 6.0, Duration::from_secs(5)).unwrap();
        assert_eq!(storage.get_list("log").unwrap(), vec![6.0]);
        assert_eq!(storage.len(), 1);

        // An expired counter can be reused as a list too
        storage.increment("swap", Duration::from_secs(1)).unwrap();
        clock.advance(Duration::from_secs(1));
        storage.add_to_list("swap", 7.0, Duration::from_secs(1)).unwrap();
        assert_eq!(storage.get_list("swap").unwrap(), vec![7.0]);
    }

    #[test]
    fn test_concurrent_increments_across_keys() {
        let storage = Arc::new(ShardedMemoryStorage::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let storage = storage.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        storage.increment("shared", Duration::from_secs(60)).unwrap();
                        storage
                            .increment(&format!("own-{}", i), Duration::from_secs(60))
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(storage.get("shared").unwrap(), Some(2000));
        assert_eq!(storage.get("own-3").unwrap(), Some(250));
    }
}
