//! Relationship service
//!
//! Front door for relationship lists: consults the injected cache,
//! recomputes from the graph on a miss, and applies pending graph-change
//! notifications before every lookup so a mutation is never papered over
//! by a stale entry.

use crate::error::{Error, Result};
use crate::relationship::cache::{CacheKey, RelationshipCache};
use crate::store::{GraphChange, RelationshipGraph};
use crate::types::{ActorId, RelationshipPreview, RelationshipRecord, RelationshipType};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

/// Cached view over the relationship graph.
pub struct RelationshipService {
    graph: Arc<dyn RelationshipGraph>,
    cache: Arc<dyn RelationshipCache>,
    changes: Mutex<broadcast::Receiver<GraphChange>>,
}

impl RelationshipService {
    /// Wire the service to a graph and a cache. Subscribes to the graph's
    /// change notifications immediately so no mutation slips past.
    pub fn new(graph: Arc<dyn RelationshipGraph>, cache: Arc<dyn RelationshipCache>) -> Self {
        let changes = Mutex::new(graph.subscribe());
        RelationshipService {
            graph,
            cache,
            changes,
        }
    }

    /// Up to `count` relationships of `rel_type` for `owner`, most
    /// recently established first. Served from cache when fresh.
    ///
    /// Concurrent misses for the same key may each recompute; the last
    /// write wins and every returned list is internally consistent.
    pub fn get_relationships(
        &self,
        owner: ActorId,
        rel_type: RelationshipType,
        count: usize,
    ) -> Result<Vec<RelationshipRecord>> {
        if count == 0 {
            return Err(Error::InvalidFilter(
                "relationship count must be greater than zero".to_string(),
            ));
        }

        self.drain_changes();

        let key = CacheKey::new(owner, rel_type, count);
        if let Some(bytes) = self.cache.get(&key) {
            match serde_json::from_slice::<Vec<RelationshipRecord>>(&bytes) {
                Ok(records) => {
                    tracing::trace!(owner = %owner, rel_type = %rel_type, count, "relationship cache hit");
                    return Ok(records);
                }
                Err(e) => {
                    // Corrupt entry: drop it and fall through to a
                    // recompute. Never surfaced to the caller.
                    tracing::warn!(
                        owner = %owner,
                        rel_type = %rel_type,
                        count,
                        error = %e,
                        "dropping corrupt relationship cache entry"
                    );
                    self.cache.remove(&key);
                }
            }
        }

        let records = self.graph.list(owner, rel_type, count)?;
        let bytes = serde_json::to_vec(&records)?;
        self.cache.put(key, bytes);
        tracing::debug!(
            owner = %owner,
            rel_type = %rel_type,
            count,
            records = records.len(),
            "recomputed relationship list"
        );
        Ok(records)
    }

    /// Preview for a profile section: `count` records plus the uncapped
    /// total straight from the graph.
    pub fn preview(
        &self,
        owner: ActorId,
        rel_type: RelationshipType,
        count: usize,
    ) -> Result<RelationshipPreview> {
        let records = self.get_relationships(owner, rel_type, count)?;
        let total = self.graph.count(owner, rel_type)?;
        Ok(RelationshipPreview { records, total })
    }

    /// Actor ids in `owner`'s network of `rel_type`, bounded by `fanout`.
    pub fn network_actors(
        &self,
        owner: ActorId,
        rel_type: RelationshipType,
        fanout: usize,
    ) -> Result<Vec<ActorId>> {
        Ok(self
            .get_relationships(owner, rel_type, fanout)?
            .into_iter()
            .map(|r| r.actor_id)
            .collect())
    }

    /// Apply pending graph-change notifications to the cache.
    ///
    /// A lagged receiver means notifications were lost, and a lost
    /// notification could be anybody's; the only safe response is a full
    /// flush.
    fn drain_changes(&self) {
        let mut rx = self.changes.lock().unwrap();
        loop {
            match rx.try_recv() {
                Ok(change) => self.cache.invalidate_owner(change.owner),
                Err(TryRecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "graph change notifications lost; flushing cache");
                    self.cache.clear();
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationship::cache::MemoryRelationshipCache;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn service() -> (Arc<MemoryStore>, RelationshipService) {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryRelationshipCache::new());
        let service = RelationshipService::new(store.clone(), cache);
        (store, service)
    }

    fn add_friend(store: &MemoryStore, owner: u64, other: u64, at: i64) {
        store.add_relationship(
            ActorId(owner),
            ActorId(other),
            RelationshipType::Friend,
            Utc.timestamp_opt(at, 0).unwrap(),
        );
    }

    #[test]
    fn miss_then_hit_returns_identical_records() {
        let (store, service) = service();
        add_friend(&store, 1, 2, 100);
        add_friend(&store, 1, 3, 200);

        let first = service
            .get_relationships(ActorId(1), RelationshipType::Friend, 4)
            .unwrap();
        let second = service
            .get_relationships(ActorId(1), RelationshipType::Friend, 4)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].actor_id, ActorId(3));
    }

    #[test]
    fn mutation_invalidates_before_next_lookup() {
        let (store, service) = service();
        for (other, at) in [(2, 100), (3, 200), (4, 300), (5, 400)] {
            add_friend(&store, 1, other, at);
        }
        let before = service
            .get_relationships(ActorId(1), RelationshipType::Friend, 4)
            .unwrap();
        assert_eq!(before[0].actor_id, ActorId(5));

        // a 5th friend arrives; the cached top-4 is now stale
        add_friend(&store, 1, 6, 500);
        let after = service
            .get_relationships(ActorId(1), RelationshipType::Friend, 4)
            .unwrap();
        assert_eq!(after.len(), 4);
        assert_eq!(after[0].actor_id, ActorId(6));
        assert!(!after.iter().any(|r| r.actor_id == ActorId(2)));
    }

    #[test]
    fn differing_count_is_a_miss_not_a_truncation() {
        let (store, service) = service();
        for (other, at) in [(2, 100), (3, 200), (4, 300)] {
            add_friend(&store, 1, other, at);
        }
        let four = service
            .get_relationships(ActorId(1), RelationshipType::Friend, 4)
            .unwrap();
        let two = service
            .get_relationships(ActorId(1), RelationshipType::Friend, 2)
            .unwrap();
        assert_eq!(four.len(), 3);
        assert_eq!(two.len(), 2);
    }

    #[test]
    fn corrupt_entry_is_dropped_and_recomputed() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryRelationshipCache::new());
        let service = RelationshipService::new(store.clone(), cache.clone());
        add_friend(&store, 1, 2, 100);
        // drain the add notification so the poisoned entry survives
        let _ = service
            .get_relationships(ActorId(1), RelationshipType::Friend, 4)
            .unwrap();

        cache.put(
            CacheKey::new(ActorId(1), RelationshipType::Friend, 4),
            b"not json at all".to_vec(),
        );

        let records = service
            .get_relationships(ActorId(1), RelationshipType::Friend, 4)
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].actor_id, ActorId(2));
    }

    #[test]
    fn zero_count_is_rejected() {
        let (_, service) = service();
        let err = service
            .get_relationships(ActorId(1), RelationshipType::Friend, 0)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFilter(_)));
    }

    #[test]
    fn preview_reports_uncapped_total() {
        let (store, service) = service();
        for (other, at) in [(2, 100), (3, 200), (4, 300), (5, 400), (6, 500)] {
            add_friend(&store, 1, other, at);
        }
        let preview = service
            .preview(ActorId(1), RelationshipType::Friend, 4)
            .unwrap();
        assert_eq!(preview.records.len(), 4);
        assert_eq!(preview.total, 5);
        assert!(preview.has_more());
    }

    #[test]
    fn concurrent_lookups_and_mutations_stay_fresh() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryRelationshipCache::new());
        let service = Arc::new(RelationshipService::new(store.clone(), cache));
        add_friend(&store, 1, 2, 0);

        let mut handles = Vec::new();
        for t in 0..4u64 {
            let store = Arc::clone(&store);
            let service = Arc::clone(&service);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    if t == 0 {
                        add_friend(&store, 1, 100 + i, 1000 + i as i64);
                    } else {
                        let records = service
                            .get_relationships(ActorId(1), RelationshipType::Friend, 4)
                            .expect("lookup failed");
                        assert!(records.len() <= 4);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().expect("service thread panicked");
        }

        // once the dust settles, the next lookup reflects the last write
        let records = service
            .get_relationships(ActorId(1), RelationshipType::Friend, 4)
            .unwrap();
        assert_eq!(records[0].actor_id, ActorId(149));
    }
}
