//! Relationship list cache
//!
//! Thread-safe memoization of derived relationship lists. Values are
//! opaque serialized bytes: round-trips are byte-comparable, structural
//! damage is detectable on read, and the cache contract stays identical
//! whether the backing store is this in-memory map or an external
//! key-value store.

use crate::types::{ActorId, RelationshipType};
use dashmap::DashMap;
use std::collections::HashMap;

/// Cache key for one derived relationship list.
///
/// The requested count is part of the key: a 4-record page and a
/// 50-record fanout list for the same owner are different cached values,
/// and serving one for the other is how truncated stale results happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub owner: ActorId,
    pub rel_type: RelationshipType,
    pub count: usize,
}

impl CacheKey {
    pub fn new(owner: ActorId, rel_type: RelationshipType, count: usize) -> Self {
        CacheKey {
            owner,
            rel_type,
            count,
        }
    }
}

/// Storage contract for memoized relationship lists.
///
/// Writes are replace-whole-value; a reader never observes a partially
/// written entry. Invalidation is per-owner and coarse: counts vary by
/// call site, so dropping everything the owner has cached is the only
/// safe granularity.
pub trait RelationshipCache: Send + Sync {
    /// Cached bytes for `key`, if present
    fn get(&self, key: &CacheKey) -> Option<Vec<u8>>;

    /// Replace the value for `key`
    fn put(&self, key: CacheKey, value: Vec<u8>);

    /// Drop one entry (used when a value fails validation on read)
    fn remove(&self, key: &CacheKey);

    /// Drop every entry keyed by `owner`, across all types and counts
    fn invalidate_owner(&self, owner: ActorId);

    /// Drop everything (used when change notifications were lost)
    fn clear(&self);

    /// Number of cached entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory [`RelationshipCache`] over a sharded concurrent map.
///
/// Keyed by owner at the top level so per-owner invalidation is one map
/// removal under a single shard lock; unrelated owners' traffic never
/// contends on it.
pub struct MemoryRelationshipCache {
    entries: DashMap<ActorId, HashMap<(RelationshipType, usize), Vec<u8>>>,
}

impl MemoryRelationshipCache {
    pub fn new() -> Self {
        MemoryRelationshipCache {
            entries: DashMap::new(),
        }
    }
}

impl Default for MemoryRelationshipCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationshipCache for MemoryRelationshipCache {
    fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        self.entries
            .get(&key.owner)
            .and_then(|bucket| bucket.get(&(key.rel_type, key.count)).cloned())
    }

    fn put(&self, key: CacheKey, value: Vec<u8>) {
        self.entries
            .entry(key.owner)
            .or_default()
            .insert((key.rel_type, key.count), value);
    }

    fn remove(&self, key: &CacheKey) {
        if let Some(mut bucket) = self.entries.get_mut(&key.owner) {
            bucket.remove(&(key.rel_type, key.count));
        }
    }

    fn invalidate_owner(&self, owner: ActorId) {
        if self.entries.remove(&owner).is_some() {
            tracing::debug!(owner = %owner, "invalidated cached relationship lists");
        }
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.iter().map(|bucket| bucket.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(owner: u64, count: usize) -> CacheKey {
        CacheKey::new(ActorId(owner), RelationshipType::Friend, count)
    }

    #[test]
    fn stores_and_replaces_whole_values() {
        let cache = MemoryRelationshipCache::new();
        cache.put(key(1, 4), b"first".to_vec());
        assert_eq!(cache.get(&key(1, 4)), Some(b"first".to_vec()));

        cache.put(key(1, 4), b"second".to_vec());
        assert_eq!(cache.get(&key(1, 4)), Some(b"second".to_vec()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn count_is_part_of_the_key() {
        let cache = MemoryRelationshipCache::new();
        cache.put(key(1, 4), b"four".to_vec());
        assert_eq!(cache.get(&key(1, 8)), None);

        cache.put(key(1, 8), b"eight".to_vec());
        assert_eq!(cache.get(&key(1, 4)), Some(b"four".to_vec()));
        assert_eq!(cache.get(&key(1, 8)), Some(b"eight".to_vec()));
    }

    #[test]
    fn invalidation_sweeps_every_count_and_type() {
        let cache = MemoryRelationshipCache::new();
        cache.put(key(1, 4), b"a".to_vec());
        cache.put(key(1, 50), b"b".to_vec());
        cache.put(
            CacheKey::new(ActorId(1), RelationshipType::Foe, 4),
            b"c".to_vec(),
        );
        cache.put(key(2, 4), b"other owner".to_vec());

        cache.invalidate_owner(ActorId(1));
        assert_eq!(cache.get(&key(1, 4)), None);
        assert_eq!(cache.get(&key(1, 50)), None);
        assert_eq!(
            cache.get(&CacheKey::new(ActorId(1), RelationshipType::Foe, 4)),
            None
        );
        // other owners untouched
        assert_eq!(cache.get(&key(2, 4)), Some(b"other owner".to_vec()));
    }

    #[test]
    fn concurrent_writers_and_readers_never_see_partial_values() {
        let cache = Arc::new(MemoryRelationshipCache::new());
        let mut handles = Vec::new();

        for writer in 0..4u64 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                for i in 0..200usize {
                    let value = vec![writer as u8; 64];
                    cache.put(key(writer, i % 3), value);
                }
            }));
        }
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                for i in 0..200usize {
                    for owner in 0..4u64 {
                        if let Some(value) = cache.get(&key(owner, i % 3)) {
                            // whole-value writes: every byte matches the writer id
                            assert_eq!(value.len(), 64);
                            assert!(value.iter().all(|b| *b == owner as u8));
                        }
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().expect("cache thread panicked");
        }
    }
}
