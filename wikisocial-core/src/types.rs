//! Core domain types for wikisocial
//!
//! These types form the canonical data model for the profile subsystem:
//! social events, the aggregated feed handed to presenters, and the
//! relationship records served through the cache.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Actor** | A user identity, referenced by stable id (never by display name) |
//! | **Owner** | The actor whose profile page is being assembled |
//! | **Viewer** | The identity looking at the page; may be anonymous |
//! | **Activity item** | One social event: edit, vote, friend/foe add, message |
//! | **Feed** | Ordered, filtered, capped sequence of activity items |
//! | **Relationship** | A typed, timestamped social edge between two actors |
//! | **Gating** | Dropping feed items the viewer may not see |
//!
//! ### Owner vs Viewer
//!
//! Visibility decisions always evaluate an (owner, viewer) pair. The owner
//! is a concrete actor; the viewer may be anonymous. We never pass a bare
//! actor id where the anonymous case is meaningful - that is what
//! [`Viewer`] is for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

// ============================================
// Actors
// ============================================

/// Stable identifier for a user identity.
///
/// Display names belong to the host platform; the core only ever sees ids.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ActorId(pub u64);

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ActorId {
    fn from(id: u64) -> Self {
        ActorId(id)
    }
}

/// The identity a page is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Viewer {
    /// Not logged in
    Anonymous,
    /// A logged-in actor
    Actor(ActorId),
}

impl Viewer {
    /// The viewer's actor id, if logged in
    pub fn actor_id(&self) -> Option<ActorId> {
        match self {
            Viewer::Anonymous => None,
            Viewer::Actor(id) => Some(*id),
        }
    }

    /// Whether this viewer is the given profile owner
    pub fn is_owner_of(&self, owner: ActorId) -> bool {
        self.actor_id() == Some(owner)
    }
}

// ============================================
// Relationships
// ============================================

/// Relationship edge types supported by the social graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Friend,
    Foe,
}

impl RelationshipType {
    /// Returns the identifier used in database storage and cache keys
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Friend => "friend",
            RelationshipType::Foe => "foe",
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "friend" | "friends" => Ok(RelationshipType::Friend),
            "foe" | "foes" => Ok(RelationshipType::Foe),
            _ => Err(format!("unknown relationship type: {}", s)),
        }
    }
}

/// One edge in an actor's relationship list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    /// The actor on the far end of the edge
    pub actor_id: ActorId,
    /// When the relationship was established
    pub established_at: DateTime<Utc>,
}

/// A capped relationship list plus the uncapped total.
///
/// `total` comes from the graph, not from the preview length, so presenters
/// can decide whether to offer a "view all" link.
#[derive(Debug, Clone, Serialize)]
pub struct RelationshipPreview {
    /// Most recently established relationships, up to the preview count
    pub records: Vec<RelationshipRecord>,
    /// Total number of relationships of this type in the graph
    pub total: usize,
}

impl RelationshipPreview {
    /// Whether the graph holds more records than the preview shows
    pub fn has_more(&self) -> bool {
        self.total > self.records.len()
    }
}

// ============================================
// Activity
// ============================================

/// Kind tag for activity items.
///
/// Closed set: matching on payloads is exhaustive, and kinds the filter
/// does not recognize cannot exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Edit,
    Vote,
    FriendAdded,
    FoeAdded,
    UserMessage,
    SystemMessage,
}

impl ActivityKind {
    /// Every kind, in a fixed order
    pub const ALL: [ActivityKind; 6] = [
        ActivityKind::Edit,
        ActivityKind::Vote,
        ActivityKind::FriendAdded,
        ActivityKind::FoeAdded,
        ActivityKind::UserMessage,
        ActivityKind::SystemMessage,
    ];

    /// Returns the identifier used in database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Edit => "edit",
            ActivityKind::Vote => "vote",
            ActivityKind::FriendAdded => "friend_added",
            ActivityKind::FoeAdded => "foe_added",
            ActivityKind::UserMessage => "user_message",
            ActivityKind::SystemMessage => "system_message",
        }
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "edit" => Ok(ActivityKind::Edit),
            "vote" => Ok(ActivityKind::Vote),
            "friend_added" => Ok(ActivityKind::FriendAdded),
            "foe_added" => Ok(ActivityKind::FoeAdded),
            "user_message" => Ok(ActivityKind::UserMessage),
            "system_message" => Ok(ActivityKind::SystemMessage),
            _ => Err(format!("unknown activity kind: {}", s)),
        }
    }
}

/// Reference to a wiki page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
    /// Host namespace number; 0 is the main namespace
    pub namespace: i64,
    /// Page title without the namespace prefix
    pub title: String,
}

/// Kind-specific event data.
///
/// Fields irrelevant to a kind do not exist on that variant, so an edit
/// with no target is distinguishable from one targeting namespace 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityPayload {
    /// Page edit, optionally with the edit summary
    Edit {
        page: Option<PageRef>,
        summary: Option<String>,
    },

    /// Vote cast on a page
    Vote { page: Option<PageRef> },

    /// The actor added someone as a friend
    FriendAdded { other: ActorId },

    /// The actor added someone as a foe
    FoeAdded { other: ActorId },

    /// Board message sent to another actor
    UserMessage {
        to: ActorId,
        comment: String,
        /// Private messages are gated to their participants
        private: bool,
    },

    /// Host-generated notice (award, level change, ...)
    SystemMessage { comment: String },
}

impl ActivityPayload {
    /// Kind tag for this payload
    pub fn kind(&self) -> ActivityKind {
        match self {
            ActivityPayload::Edit { .. } => ActivityKind::Edit,
            ActivityPayload::Vote { .. } => ActivityKind::Vote,
            ActivityPayload::FriendAdded { .. } => ActivityKind::FriendAdded,
            ActivityPayload::FoeAdded { .. } => ActivityKind::FoeAdded,
            ActivityPayload::UserMessage { .. } => ActivityKind::UserMessage,
            ActivityPayload::SystemMessage { .. } => ActivityKind::SystemMessage,
        }
    }
}

/// One social event attributable to an actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityItem {
    /// Actor who generated the event
    pub actor_id: ActorId,
    /// Event time; the feed ordering key. Ties keep retrieval order.
    pub timestamp: DateTime<Utc>,
    /// Kind-specific payload
    pub payload: ActivityPayload,
}

impl ActivityItem {
    /// Kind tag for this item
    pub fn kind(&self) -> ActivityKind {
        self.payload.kind()
    }
}

// ============================================
// Feed
// ============================================

/// Position of an item within its adjacency group.
///
/// Consecutive feed items sharing (kind, actor) form one display group.
/// The feed records boundaries instead of collapsing records, so the
/// presenter can render a group however it wants without losing items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMark {
    /// Item opens its group
    pub first: bool,
    /// Item closes its group
    pub last: bool,
}

impl GroupMark {
    /// Mark for an item that is a group of one
    pub fn solo() -> Self {
        GroupMark {
            first: true,
            last: true,
        }
    }
}

/// An activity item annotated for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedItem {
    /// The underlying event
    pub item: ActivityItem,
    /// Adjacency-group position
    pub group: GroupMark,
    /// Set on the last item rendered before the cutoff
    pub boundary: bool,
}

/// Signal attached to a feed that degraded instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSignal {
    /// The event store was unreachable or timed out; the feed is empty or
    /// partial and callers should render it as such, not as an error.
    SourceUnavailable,
}

/// Ordered, filtered, capped feed of activity for one owner.
///
/// Items are strictly non-increasing by timestamp. `total_count` counts
/// every item that matched the kind filter before gating and truncation,
/// so "view all" thresholds see hidden items while the visible window does
/// not.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityFeed {
    /// Items the viewer may see, newest first, at most `display_limit`
    pub items: Vec<FeedItem>,
    /// Display cap the feed was built with
    pub display_limit: usize,
    /// min(display_limit, items.len()); where interior styling ends
    pub style_boundary: usize,
    /// Matching items before gating and truncation
    pub total_count: usize,
    /// True when the hard cap or the display limit dropped items
    pub truncated: bool,
    /// Degradation signal, if any
    pub signal: Option<FeedSignal>,
}

impl ActivityFeed {
    /// An empty feed with no degradation signal
    pub fn empty(display_limit: usize) -> Self {
        ActivityFeed {
            items: Vec::new(),
            display_limit,
            style_boundary: 0,
            total_count: 0,
            truncated: false,
            signal: None,
        }
    }

    /// An empty feed standing in for an unreachable source
    pub fn degraded(display_limit: usize) -> Self {
        ActivityFeed {
            signal: Some(FeedSignal::SourceUnavailable),
            ..Self::empty(display_limit)
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether more matching activity exists than the feed shows
    pub fn has_more(&self) -> bool {
        self.total_count > self.items.len()
    }
}

/// Whose events a feed covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedScope {
    /// Events generated by the owner
    Owner,
    /// Events generated by the owner's friends or foes
    Network(RelationshipType),
}

// ============================================
// Deadlines
// ============================================

/// Wall-clock budget for collaborator calls within one request.
///
/// Store adapters check this before doing work; the aggregator checks it
/// between pipeline steps and degrades to an empty feed with a signal
/// instead of blocking past it.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// No budget; calls may take as long as they need
    pub const UNBOUNDED: Deadline = Deadline { at: None };

    /// Expires `budget` from now
    pub fn after(budget: Duration) -> Self {
        Deadline {
            at: Some(Instant::now() + budget),
        }
    }

    /// Whether the budget is spent
    pub fn expired(&self) -> bool {
        match self.at {
            Some(at) => Instant::now() >= at,
            None => false,
        }
    }

    /// Time left, if a budget is set
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Deadline::UNBOUNDED
    }
}
