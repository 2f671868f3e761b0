//! # wikisocial-core
//!
//! Core library for wikisocial - the activity feed aggregation and
//! relationship-cache subsystem behind a wiki user's social profile page.
//!
//! This library provides:
//! - Domain types for actors, activity items, feeds, and relationships
//! - The feed aggregation pipeline (filter, sort, cap, gate, group)
//! - A cached view over the relationship graph with invalidation driven
//!   by graph-change notifications
//! - Per-viewer profile field visibility and feed gating
//! - Collaborator traits with SQLite and in-memory implementations
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! The core never renders markup. A page view turns into three calls -
//! visible fields, relationship lists, activity feed - and the results
//! are handed to an external presenter:
//!
//! ```text
//! (owner, viewer) ─> VisibilityFilter ──> VisibleFieldSet
//!                 ─> RelationshipService ─> cached friend/foe lists
//!                 ─> ActivityAggregator ──> ordered, gated ActivityFeed
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wikisocial_core::{
//!     ActivityAggregator, Config, FeedRequest, MemoryRelationshipCache, MemoryStore,
//!     RelationshipService, Viewer,
//! };
//!
//! let config = Config::load().expect("failed to load config");
//! let store = Arc::new(MemoryStore::new());
//! let relationships = Arc::new(RelationshipService::new(
//!     store.clone(),
//!     Arc::new(MemoryRelationshipCache::new()),
//! ));
//! let aggregator = ActivityAggregator::new(store, relationships, config.feed);
//! let feed = aggregator
//!     .build_feed(&FeedRequest::new(7u64.into(), Viewer::Anonymous))
//!     .expect("failed to build feed");
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use feed::{ActivityAggregator, FeedFilter, FeedRequest};
pub use profile::{ProfileRenderData, ProfileService, SectionOutcome};
pub use relationship::{MemoryRelationshipCache, RelationshipCache, RelationshipService};
pub use store::{Database, MemoryStore};
pub use types::*;
pub use visibility::{VisibilityFilter, VisibleFieldSet};

// Public modules
pub mod config;
pub mod error;
pub mod feed;
pub mod logging;
pub mod profile;
pub mod relationship;
pub mod store;
pub mod types;
pub mod visibility;
