//! # Bounded Known-Hash Set
//!
//! Each peer remembers which artifacts it has already seen so we never send
//! it the same proposal, vote or fragment twice. A hostile peer can feed us
//! an unlimited stream of distinct hashes, so the set is capped: once full,
//! one existing member is evicted before the new one goes in.
//!
//! ## Eviction policy
//!
//! The victim is whichever member the hash table yields first during
//! iteration. `HashSet` seeds its hasher per process, so the victim is
//! arbitrary and not something a remote peer can steer. It is NOT
//! least-recently-used and NOT FIFO. Losing a hash only costs one redundant
//! re-send to that peer, which the peer drops as a duplicate.
//!
//! ## Concurrency
//!
//! The set is guarded by its own mutex. A peer's read loop and any number of
//! concurrent broadcast tasks may insert into it at the same time; inserts
//! are idempotent so racing marks of the same hash collapse to one entry.

use std::collections::HashSet;
use std::hash::Hash;

use parking_lot::Mutex;

use crate::crypto::ArtifactHash;

/// A capacity-bounded, internally synchronized set of hashes.
#[derive(Debug)]
pub struct KnownSet<T = ArtifactHash> {
    inner: Mutex<HashSet<T>>,
    capacity: usize,
}

impl<T> KnownSet<T>
where
    T: Eq + Hash + Clone,
{
    /// Creates an empty set holding at most `capacity` entries.
    ///
    /// A capacity of zero is bumped to one so that an inserted hash is
    /// always observable afterwards.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(HashSet::with_capacity(capacity)),
            capacity,
        }
    }

    /// Returns `true` if the hash is in the set. No side effects.
    pub fn contains(&self, hash: &T) -> bool {
        self.inner.lock().contains(hash)
    }

    /// Inserts a hash, evicting an arbitrary member first if the set is
    /// full. Returns `true` if the hash was not already present.
    pub fn insert(&self, hash: T) -> bool {
        let mut set = self.inner.lock();
        if set.contains(&hash) {
            return false;
        }
        while set.len() >= self.capacity {
            let victim = match set.iter().next() {
                Some(victim) => victim.clone(),
                None => break,
            };
            set.remove(&victim);
        }
        set.insert(hash)
    }

    /// Number of hashes currently held.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns `true` if nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Maximum number of hashes the set will hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::H256;
    use std::sync::Arc;

    fn hash(n: u64) -> H256 {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&n.to_be_bytes());
        H256(bytes)
    }

    #[test]
    fn inserted_hash_is_contained() {
        let set = KnownSet::new(4);
        assert!(!set.contains(&hash(1)));
        assert!(set.insert(hash(1)));
        assert!(set.contains(&hash(1)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn duplicate_insert_is_noop() {
        let set = KnownSet::new(4);
        set.insert(hash(1));
        set.insert(hash(2));
        assert!(!set.insert(hash(1)));
        assert_eq!(set.len(), 2);
        assert!(set.contains(&hash(1)));
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let set = KnownSet::new(16);
        for k in 0..100u64 {
            set.insert(hash(k));
            assert!(set.len() <= set.capacity());
            // The newest hash always survives its own insertion.
            assert!(set.contains(&hash(k)));
        }
        assert_eq!(set.len(), 16);
    }

    #[test]
    fn duplicate_at_capacity_does_not_evict() {
        let set = KnownSet::new(3);
        for k in 0..3u64 {
            set.insert(hash(k));
        }
        set.insert(hash(1));
        for k in 0..3u64 {
            assert!(set.contains(&hash(k)));
        }
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let set = KnownSet::new(0);
        assert_eq!(set.capacity(), 1);
        set.insert(hash(1));
        set.insert(hash(2));
        assert_eq!(set.len(), 1);
        assert!(set.contains(&hash(2)));
    }

    #[test]
    fn concurrent_inserts_respect_bound() {
        let set = Arc::new(KnownSet::new(64));
        std::thread::scope(|scope| {
            for t in 0..8u64 {
                let set = Arc::clone(&set);
                scope.spawn(move || {
                    for k in 0..500u64 {
                        set.insert(hash(t * 1_000 + k));
                        // Every thread also hammers the same shared hash.
                        set.insert(hash(u64::MAX));
                    }
                });
            }
        });
        assert!(set.len() <= 64);
    }
}
