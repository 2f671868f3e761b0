//! Relationship lists and their cache
//!
//! Friend and foe lists are the expensive graph queries on a profile
//! page, so derived lists are memoized per (owner, type, count) key and
//! invalidated whenever the graph changes for that owner. The cache is a
//! trait object injected by the hosting process; the service wires it to
//! the graph and its change notifications.

mod cache;
mod service;

pub use cache::{CacheKey, MemoryRelationshipCache, RelationshipCache};
pub use service::RelationshipService;
