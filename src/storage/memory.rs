//! Single-lock in-memory storage.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use super::{ListStorage, Storage, StorageError};
use crate::clock::{Clock, SystemClock};

/// Number of operations between full sweeps of expired keys.
pub(super) const SWEEP_INTERVAL: u64 = 1024;

/// A stored value.
#[derive(Debug, Clone)]
pub(super) enum Value {
    Counter(i64),
    List(VecDeque<f64>),
}

/// A value together with the time it stops being visible.
#[derive(Debug, Clone)]
pub(super) struct Entry {
    pub(super) value: Value,
    pub(super) expires_at: f64,
}

impl Entry {
    pub(super) fn counter(value: i64, expires_at: f64) -> Self {
        Self {
            value: Value::Counter(value),
            expires_at,
        }
    }

    pub(super) fn list(first: f64, expires_at: f64) -> Self {
        Self {
            value: Value::List(VecDeque::from([first])),
            expires_at,
        }
    }

    pub(super) fn is_expired(&self, now: f64) -> bool {
        self.expires_at <= now
    }

    pub(super) fn as_counter(&self, key: &str) -> Result<i64, StorageError> {
        match self.value {
            Value::Counter(count) => Ok(count),
            Value::List(_) => Err(wrong_type(key, "counter")),
        }
    }

    pub(super) fn as_list(&self, key: &str) -> Result<&VecDeque<f64>, StorageError> {
        match &self.value {
            Value::List(list) => Ok(list),
            Value::Counter(_) => Err(wrong_type(key, "list")),
        }
    }

    pub(super) fn list_mut(&mut self, key: &str) -> Result<&mut VecDeque<f64>, StorageError> {
        match &mut self.value {
            Value::List(list) => Ok(list),
            Value::Counter(_) => Err(wrong_type(key, "list")),
        }
    }
}

pub(super) fn wrong_type(key: &str, expected: &'static str) -> StorageError {
    StorageError::WrongType {
        key: key.to_string(),
        expected,
    }
}

pub(super) fn expiry(now: f64, ttl: Duration) -> f64 {
    now + ttl.as_secs_f64()
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    ops_since_sweep: u64,
}

impl Inner {
    /// Get a key's entry, dropping it first if it has expired.
    fn live(&mut self, key: &str, now: f64) -> Option<&mut Entry> {
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn sweep(&mut self, now: f64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        self.ops_since_sweep = 0;
        before - self.entries.len()
    }
}

/// Reference in-memory storage.
///
/// One mutex guards every key, which is fine for a single process where each
/// operation holds it for a hash lookup. Expiry is a recorded timestamp per
/// key: the touched key is checked at the start of every operation, and a full
/// sweep runs every few thousand operations. Not shared across processes or
/// hosts; use an external backend for that.
pub struct MemoryStorage {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl MemoryStorage {
    /// Create an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
        }
    }

    /// Remove every expired key now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let removed = self.inner.lock().sweep(now);
        trace!(removed, "Purged expired keys");
        removed
    }

    /// Number of keys currently held, including any not yet purged.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lock the map, running the periodic sweep if it is due.
    fn begin(&self) -> (parking_lot::MutexGuard<'_, Inner>, f64) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.ops_since_sweep += 1;
        if inner.ops_since_sweep >= SWEEP_INTERVAL {
            inner.sweep(now);
        }
        (inner, now)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn increment(&self, key: &str, ttl: Duration) -> Result<i64, StorageError> {
        let (mut inner, now) = self.begin();
        let expires_at = expiry(now, ttl);

        match inner.live(key, now) {
            Some(entry) => {
                let count = entry.as_counter(key)? + 1;
                *entry = Entry::counter(count, expires_at);
                Ok(count)
            }
            None => {
                inner
                    .entries
                    .insert(key.to_string(), Entry::counter(1, expires_at));
                Ok(1)
            }
        }
    }

    fn get(&self, key: &str) -> Result<Option<i64>, StorageError> {
        let (mut inner, now) = self.begin();
        inner.live(key, now).map(|e| e.as_counter(key)).transpose()
    }

    fn set(&self, key: &str, value: i64, ttl: Duration) -> Result<(), StorageError> {
        let (mut inner, now) = self.begin();
        inner
            .entries
            .insert(key.to_string(), Entry::counter(value, expiry(now, ttl)));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let (mut inner, _) = self.begin();
        inner.entries.remove(key);
        Ok(())
    }

    fn lists(&self) -> Option<&dyn ListStorage> {
        Some(self)
    }
}

impl ListStorage for MemoryStorage {
    fn get_list(&self, key: &str) -> Result<Vec<f64>, StorageError> {
        let (mut inner, now) = self.begin();
        match inner.live(key, now) {
            Some(entry) => Ok(entry.as_list(key)?.iter().copied().collect()),
            None => Ok(Vec::new()),
        }
    }

    fn add_to_list(&self, key: &str, value: f64, ttl: Duration) -> Result<(), StorageError> {
        let (mut inner, now) = self.begin();
        let expires_at = expiry(now, ttl);

        match inner.live(key, now) {
            Some(entry) => {
                entry.list_mut(key)?.push_back(value);
                entry.expires_at = expires_at;
            }
            None => {
                inner
                    .entries
                    .insert(key.to_string(), Entry::list(value, expires_at));
            }
        }
        Ok(())
    }

    fn cleanup_list(&self, key: &str, cutoff: f64) -> Result<(), StorageError> {
        let (mut inner, now) = self.begin();
        let emptied = match inner.live(key, now) {
            Some(entry) => {
                let list = entry.list_mut(key)?;
                list.retain(|t| *t > cutoff);
                list.is_empty()
            }
            None => false,
        };
        if emptied {
            inner.entries.remove(key);
        }
        Ok(())
    }
}
