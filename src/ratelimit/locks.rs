//! Striped per-identity locks.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use parking_lot::{Mutex, MutexGuard};

/// Number of lock stripes.
const STRIPES: usize = 64;

/// A fixed set of mutexes indexed by identity hash.
///
/// Algorithms whose decision is a read followed by a write hold the identity's
/// stripe across both, so concurrent calls for one identity are serialized.
/// Distinct identities only share a stripe on a hash collision.
pub(crate) struct KeyLocks {
    stripes: Box<[Mutex<()>]>,
}

impl KeyLocks {
    pub(crate) fn new() -> Self {
        Self {
            stripes: (0..STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Lock the stripe owning `identity`.
    pub(crate) fn lock(&self, identity: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        identity.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.stripes.len();
        self.stripes[index].lock()
    }
}

impl Default for KeyLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_identity_shares_a_stripe() {
        let locks = KeyLocks::new();
        let guard = locks.lock("alice");
        assert!(locks.stripes.iter().any(|m| m.is_locked()));
        drop(guard);
        assert!(locks.stripes.iter().all(|m| !m.is_locked()));
    }
}
