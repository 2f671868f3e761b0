//! External collaborator seams
//!
//! The core never talks to the host platform directly. Everything it
//! needs - the event log, the relationship graph, stored privacy rules -
//! arrives through the traits in this module, so the hosting process
//! decides whether the backing store is the bundled SQLite adapter, the
//! in-memory store, or something else entirely.

use crate::error::Result;
use crate::types::{ActivityItem, ActorId, Deadline, RelationshipRecord, RelationshipType};
use crate::visibility::{PrivacyLevel, ProfileField};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::broadcast;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::Database;

/// Notification that an owner's relationship graph changed.
///
/// Carried on a broadcast channel from graph implementations to whoever
/// caches derived relationship data. Coarse on purpose: the payload names
/// only the owner, and subscribers drop everything they hold for that
/// owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphChange {
    /// The actor whose relationship lists are now stale
    pub owner: ActorId,
}

/// Read-only query interface over the host's social event log.
pub trait ActivityStore: Send + Sync {
    /// Events generated by any of `actors`, newest first; ties in
    /// insertion order. `since` bounds how far back the store looks.
    ///
    /// Returns [`Error::SourceUnavailable`](crate::Error::SourceUnavailable)
    /// when the log cannot be reached or `deadline` has expired; callers
    /// degrade rather than fail the page.
    fn query(
        &self,
        actors: &[ActorId],
        since: Option<DateTime<Utc>>,
        deadline: Deadline,
    ) -> Result<Vec<ActivityItem>>;

    /// Board messages addressed to `owner`, newest first, ungated.
    ///
    /// Gating against the viewer happens in the caller; the store returns
    /// private messages too.
    fn board_messages(&self, owner: ActorId, deadline: Deadline) -> Result<Vec<ActivityItem>>;
}

/// Read interface over the relationship graph, plus change notifications.
pub trait RelationshipGraph: Send + Sync {
    /// Up to `count` relationships of `rel_type` for `owner`, most
    /// recently established first.
    fn list(
        &self,
        owner: ActorId,
        rel_type: RelationshipType,
        count: usize,
    ) -> Result<Vec<RelationshipRecord>>;

    /// Total relationships of `rel_type` for `owner`, uncapped.
    fn count(&self, owner: ActorId, rel_type: RelationshipType) -> Result<usize>;

    /// Whether an edge of `rel_type` exists from `owner` to `other`.
    fn related(&self, owner: ActorId, other: ActorId, rel_type: RelationshipType) -> Result<bool>;

    /// Subscribe to graph mutations. Every add or remove broadcasts a
    /// [`GraphChange`] for each endpoint whose lists it touches.
    fn subscribe(&self) -> broadcast::Receiver<GraphChange>;
}

/// Stored per-owner privacy rules.
pub trait PrivacyStore: Send + Sync {
    /// Explicit per-field rules for `owner`. Fields absent from the map
    /// fall back to the default policy.
    fn rules(&self, owner: ActorId) -> Result<HashMap<ProfileField, PrivacyLevel>>;
}
