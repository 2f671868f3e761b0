//! In-memory collaborator implementation
//!
//! Backs the activity log, the relationship graph, and privacy rules with
//! plain locked maps. Used by tests and anywhere a fixture store is more
//! convenient than SQLite. Mutations broadcast [`GraphChange`]
//! notifications exactly like the persistent adapter.

use crate::error::{Error, Result};
use crate::store::{ActivityStore, GraphChange, PrivacyStore, RelationshipGraph};
use crate::types::{
    ActivityItem, ActivityPayload, ActorId, Deadline, RelationshipRecord, RelationshipType,
};
use crate::visibility::{PrivacyLevel, ProfileField};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;

/// In-memory activity log, relationship graph, and privacy rules.
pub struct MemoryStore {
    /// Events in insertion order; queries preserve this order for ties
    activity: Mutex<Vec<ActivityItem>>,
    /// Edges per (owner, type), most recently established first
    relationships: Mutex<HashMap<(ActorId, RelationshipType), Vec<RelationshipRecord>>>,
    /// Explicit privacy rules per owner
    privacy: Mutex<HashMap<ActorId, HashMap<ProfileField, PrivacyLevel>>>,
    /// When set, queries fail with SourceUnavailable
    unavailable: AtomicBool,
    changes: broadcast::Sender<GraphChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        MemoryStore {
            activity: Mutex::new(Vec::new()),
            relationships: Mutex::new(HashMap::new()),
            privacy: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
            changes,
        }
    }

    /// Append one event to the log.
    pub fn push_activity(&self, item: ActivityItem) {
        self.activity.lock().unwrap().push(item);
    }

    /// Add an edge from `owner` to `other`.
    ///
    /// Broadcasts a change for the owner; cached lists for that owner are
    /// stale from this point on.
    pub fn add_relationship(
        &self,
        owner: ActorId,
        other: ActorId,
        rel_type: RelationshipType,
        established_at: DateTime<Utc>,
    ) {
        let mut map = self.relationships.lock().unwrap();
        let edges = map.entry((owner, rel_type)).or_default();
        edges.retain(|r| r.actor_id != other);
        edges.insert(
            0,
            RelationshipRecord {
                actor_id: other,
                established_at,
            },
        );
        drop(map);
        let _ = self.changes.send(GraphChange { owner });
    }

    /// Remove the edge from `owner` to `other`, if present.
    pub fn remove_relationship(&self, owner: ActorId, other: ActorId, rel_type: RelationshipType) {
        let mut map = self.relationships.lock().unwrap();
        if let Some(edges) = map.get_mut(&(owner, rel_type)) {
            edges.retain(|r| r.actor_id != other);
        }
        drop(map);
        let _ = self.changes.send(GraphChange { owner });
    }

    /// Set one explicit privacy rule for an owner's field.
    pub fn set_privacy(&self, owner: ActorId, field: ProfileField, level: PrivacyLevel) {
        self.privacy
            .lock()
            .unwrap()
            .entry(owner)
            .or_default()
            .insert(field, level);
    }

    /// Toggle simulated outage; while set, every query fails with
    /// `SourceUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_reachable(&self, deadline: Deadline) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::unavailable("memory store", "simulated outage"));
        }
        if deadline.expired() {
            return Err(Error::unavailable("memory store", "request deadline expired"));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityStore for MemoryStore {
    fn query(
        &self,
        actors: &[ActorId],
        since: Option<DateTime<Utc>>,
        deadline: Deadline,
    ) -> Result<Vec<ActivityItem>> {
        self.check_reachable(deadline)?;
        let activity = self.activity.lock().unwrap();
        Ok(activity
            .iter()
            .filter(|item| actors.contains(&item.actor_id))
            .filter(|item| since.map_or(true, |s| item.timestamp >= s))
            .cloned()
            .collect())
    }

    fn board_messages(&self, owner: ActorId, deadline: Deadline) -> Result<Vec<ActivityItem>> {
        self.check_reachable(deadline)?;
        let activity = self.activity.lock().unwrap();
        let mut messages: Vec<ActivityItem> = activity
            .iter()
            .filter(|item| {
                matches!(&item.payload, ActivityPayload::UserMessage { to, .. } if *to == owner)
            })
            .cloned()
            .collect();
        // newest first, insertion order for ties (stable sort)
        messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(messages)
    }
}

impl RelationshipGraph for MemoryStore {
    fn list(
        &self,
        owner: ActorId,
        rel_type: RelationshipType,
        count: usize,
    ) -> Result<Vec<RelationshipRecord>> {
        self.check_reachable(Deadline::UNBOUNDED)?;
        let map = self.relationships.lock().unwrap();
        let edges = match map.get(&(owner, rel_type)) {
            Some(edges) => edges,
            None => return Ok(Vec::new()),
        };
        let mut records = edges.clone();
        records.sort_by(|a, b| b.established_at.cmp(&a.established_at));
        records.truncate(count);
        Ok(records)
    }

    fn count(&self, owner: ActorId, rel_type: RelationshipType) -> Result<usize> {
        self.check_reachable(Deadline::UNBOUNDED)?;
        let map = self.relationships.lock().unwrap();
        Ok(map.get(&(owner, rel_type)).map_or(0, |edges| edges.len()))
    }

    fn related(&self, owner: ActorId, other: ActorId, rel_type: RelationshipType) -> Result<bool> {
        self.check_reachable(Deadline::UNBOUNDED)?;
        let map = self.relationships.lock().unwrap();
        Ok(map
            .get(&(owner, rel_type))
            .map_or(false, |edges| edges.iter().any(|r| r.actor_id == other)))
    }

    fn subscribe(&self) -> broadcast::Receiver<GraphChange> {
        self.changes.subscribe()
    }
}

impl PrivacyStore for MemoryStore {
    fn rules(&self, owner: ActorId) -> Result<HashMap<ProfileField, PrivacyLevel>> {
        Ok(self
            .privacy
            .lock()
            .unwrap()
            .get(&owner)
            .cloned()
            .unwrap_or_default())
    }
}
