//! Profile assembler
//!
//! Builds everything a presenter needs to render one profile page for an
//! (owner, viewer) pair. Sections fail independently: a broken store
//! empties one section, never the page.

use crate::config::Config;
use crate::error::Result;
use crate::feed::{ActivityAggregator, FeedRequest};
use crate::relationship::RelationshipService;
use crate::store::ActivityStore;
use crate::types::{
    ActivityFeed, ActivityItem, ActivityKind, ActorId, Deadline, RelationshipPreview,
    RelationshipType, Viewer,
};
use crate::visibility::{can_view_item, ProfileField, VisibilityFilter, VisibleFieldSet};
use serde::Serialize;
use std::sync::Arc;

/// Outcome of assembling one profile section.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionOutcome<T> {
    /// Section data, ready to render
    Rendered(T),
    /// Section toggled off in configuration
    Disabled,
    /// Section failed; render it empty, page proceeds
    Failed,
}

impl<T> SectionOutcome<T> {
    /// The rendered data, if any
    pub fn rendered(&self) -> Option<&T> {
        match self {
            SectionOutcome::Rendered(data) => Some(data),
            _ => None,
        }
    }
}

/// Per-kind activity tallies for the stats section.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileStats {
    pub edits: usize,
    pub votes: usize,
    pub user_messages: usize,
    pub friends: usize,
    pub foes: usize,
}

/// The board section: gated preview plus the gated total.
///
/// `total` counts every message this viewer is allowed to know about, so
/// the owner's "view all" threshold includes private messages while a
/// stranger's does not.
#[derive(Debug, Clone, Serialize)]
pub struct BoardPreview {
    pub messages: Vec<ActivityItem>,
    pub total: usize,
}

/// Everything the presenter needs for one profile page.
#[derive(Debug, Serialize)]
pub struct ProfileRenderData {
    pub owner: ActorId,
    pub personal: SectionOutcome<VisibleFieldSet>,
    pub interests: SectionOutcome<VisibleFieldSet>,
    pub stats: SectionOutcome<ProfileStats>,
    pub friends: SectionOutcome<RelationshipPreview>,
    pub foes: SectionOutcome<RelationshipPreview>,
    pub activity: SectionOutcome<ActivityFeed>,
    pub board: SectionOutcome<BoardPreview>,
}

/// Assembles profile pages from the core services.
pub struct ProfileService {
    store: Arc<dyn ActivityStore>,
    relationships: Arc<RelationshipService>,
    visibility: VisibilityFilter,
    aggregator: ActivityAggregator,
    config: Config,
}

impl ProfileService {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        relationships: Arc<RelationshipService>,
        visibility: VisibilityFilter,
        aggregator: ActivityAggregator,
        config: Config,
    ) -> Self {
        ProfileService {
            store,
            relationships,
            visibility,
            aggregator,
            config,
        }
    }

    /// Assemble the page for `owner` as seen by `viewer`.
    ///
    /// Infallible by design: each section catches its own errors and
    /// reports `Failed` instead of propagating.
    pub fn assemble(&self, owner: ActorId, viewer: Viewer, deadline: Deadline) -> ProfileRenderData {
        let toggles = &self.config.sections;

        let fields = self.section(toggles.personal || toggles.interests, "fields", || {
            self.visibility.compute_visible_fields(owner, viewer)
        });

        let personal = match (&fields, toggles.personal) {
            (_, false) => SectionOutcome::Disabled,
            (SectionOutcome::Rendered(set), true) => {
                SectionOutcome::Rendered(set.subset(&ProfileField::PERSONAL))
            }
            _ => SectionOutcome::Failed,
        };
        let interests = match (&fields, toggles.interests) {
            (_, false) => SectionOutcome::Disabled,
            (SectionOutcome::Rendered(set), true) => {
                SectionOutcome::Rendered(set.subset(&ProfileField::INTERESTS))
            }
            _ => SectionOutcome::Failed,
        };

        let stats = self.section(toggles.stats, "stats", || self.build_stats(owner, deadline));

        let friends = self.section(toggles.friends, "friends", || {
            self.relationships.preview(
                owner,
                RelationshipType::Friend,
                self.config.relationships.preview_count,
            )
        });
        let foes = self.section(toggles.foes, "foes", || {
            self.relationships.preview(
                owner,
                RelationshipType::Foe,
                self.config.relationships.preview_count,
            )
        });

        let activity = self.section(toggles.activity, "activity", || {
            let mut request = FeedRequest::new(owner, viewer);
            request.deadline = deadline;
            self.aggregator.build_feed(&request)
        });

        let board = self.section(toggles.board, "board", || {
            self.build_board(owner, viewer, deadline)
        });

        ProfileRenderData {
            owner,
            personal,
            interests,
            stats,
            friends,
            foes,
            activity,
            board,
        }
    }

    /// Run one section builder under failure isolation.
    fn section<T>(
        &self,
        enabled: bool,
        name: &str,
        build: impl FnOnce() -> Result<T>,
    ) -> SectionOutcome<T> {
        if !enabled {
            return SectionOutcome::Disabled;
        }
        match build() {
            Ok(data) => SectionOutcome::Rendered(data),
            Err(e) => {
                tracing::warn!(section = name, error = %e, "profile section failed");
                SectionOutcome::Failed
            }
        }
    }

    fn build_stats(&self, owner: ActorId, deadline: Deadline) -> Result<ProfileStats> {
        let items = self.store.query(&[owner], None, deadline)?;
        let mut stats = ProfileStats::default();
        for item in &items {
            match item.kind() {
                ActivityKind::Edit => stats.edits += 1,
                ActivityKind::Vote => stats.votes += 1,
                ActivityKind::UserMessage => stats.user_messages += 1,
                ActivityKind::FriendAdded
                | ActivityKind::FoeAdded
                | ActivityKind::SystemMessage => {}
            }
        }
        stats.friends = self
            .relationships
            .preview(owner, RelationshipType::Friend, 1)?
            .total;
        stats.foes = self
            .relationships
            .preview(owner, RelationshipType::Foe, 1)?
            .total;
        Ok(stats)
    }

    fn build_board(
        &self,
        owner: ActorId,
        viewer: Viewer,
        deadline: Deadline,
    ) -> Result<BoardPreview> {
        let all = self.store.board_messages(owner, deadline)?;
        let visible: Vec<ActivityItem> = all
            .into_iter()
            .filter(|item| can_view_item(item, viewer))
            .collect();
        let total = visible.len();
        let mut messages = visible;
        messages.truncate(self.config.feed.board_preview);
        Ok(BoardPreview { messages, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationship::MemoryRelationshipCache;
    use crate::store::MemoryStore;
    use crate::types::ActivityPayload;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn service_with(config: Config) -> (Arc<MemoryStore>, ProfileService) {
        let store = Arc::new(MemoryStore::new());
        let relationships = Arc::new(RelationshipService::new(
            store.clone(),
            Arc::new(MemoryRelationshipCache::new()),
        ));
        let visibility = VisibilityFilter::new(store.clone(), store.clone());
        let aggregator = ActivityAggregator::new(
            store.clone(),
            relationships.clone(),
            config.feed.clone(),
        );
        let service = ProfileService::new(store.clone(), relationships, visibility, aggregator, config);
        (store, service)
    }

    fn message(from: u64, to: u64, at: i64, private: bool) -> ActivityItem {
        ActivityItem {
            actor_id: ActorId(from),
            timestamp: ts(at),
            payload: ActivityPayload::UserMessage {
                to: ActorId(to),
                comment: format!("m{}", at),
                private,
            },
        }
    }

    #[test]
    fn assembles_every_enabled_section() {
        let (store, service) = service_with(Config::default());
        store.push_activity(ActivityItem {
            actor_id: ActorId(1),
            timestamp: ts(100),
            payload: ActivityPayload::Edit {
                page: None,
                summary: None,
            },
        });
        store.add_relationship(ActorId(1), ActorId(2), RelationshipType::Friend, ts(50));

        let page = service.assemble(ActorId(1), Viewer::Actor(ActorId(1)), Deadline::UNBOUNDED);
        assert!(page.personal.rendered().is_some());
        assert!(page.interests.rendered().is_some());
        assert_eq!(page.stats.rendered().unwrap().edits, 1);
        assert_eq!(page.stats.rendered().unwrap().friends, 1);
        assert_eq!(page.friends.rendered().unwrap().total, 1);
        assert_eq!(page.activity.rendered().unwrap().len(), 1);
        assert!(page.board.rendered().is_some());
    }

    #[test]
    fn disabled_sections_are_skipped() {
        let mut config = Config::default();
        config.sections.foes = false;
        config.sections.board = false;
        let (_, service) = service_with(config);

        let page = service.assemble(ActorId(1), Viewer::Anonymous, Deadline::UNBOUNDED);
        assert!(matches!(page.foes, SectionOutcome::Disabled));
        assert!(matches!(page.board, SectionOutcome::Disabled));
        assert!(page.friends.rendered().is_some());
    }

    #[test]
    fn failed_section_does_not_take_down_the_page() {
        let (store, service) = service_with(Config::default());
        store.add_relationship(ActorId(1), ActorId(2), RelationshipType::Friend, ts(50));
        store.set_unavailable(true);

        let page = service.assemble(ActorId(1), Viewer::Anonymous, Deadline::UNBOUNDED);
        // stats and board need the store and fail; fields need only
        // privacy rules and survive; the feed degrades with a signal
        // rather than failing
        assert!(matches!(page.stats, SectionOutcome::Failed));
        assert!(matches!(page.board, SectionOutcome::Failed));
        assert!(page.personal.rendered().is_some());
        let feed = page.activity.rendered().unwrap();
        assert!(feed.is_empty());
        assert!(feed.signal.is_some());
    }

    #[test]
    fn board_totals_depend_on_the_viewer() {
        let (store, service) = service_with(Config::default());
        store.push_activity(message(2, 1, 100, false));
        store.push_activity(message(2, 1, 200, true));
        store.push_activity(message(3, 1, 300, true));

        // owner counts everything addressed to them
        let page = service.assemble(ActorId(1), Viewer::Actor(ActorId(1)), Deadline::UNBOUNDED);
        assert_eq!(page.board.rendered().unwrap().total, 3);

        // the counterparty of one private message sees it plus the public one
        let page = service.assemble(ActorId(1), Viewer::Actor(ActorId(2)), Deadline::UNBOUNDED);
        assert_eq!(page.board.rendered().unwrap().total, 2);

        // strangers count public messages only
        let page = service.assemble(ActorId(1), Viewer::Actor(ActorId(9)), Deadline::UNBOUNDED);
        assert_eq!(page.board.rendered().unwrap().total, 1);
    }

    #[test]
    fn board_preview_is_capped_but_total_is_not() {
        let mut config = Config::default();
        config.feed.board_preview = 2;
        let (store, service) = service_with(config);
        for at in [100, 200, 300, 400] {
            store.push_activity(message(2, 1, at, false));
        }

        let page = service.assemble(ActorId(1), Viewer::Anonymous, Deadline::UNBOUNDED);
        let board = page.board.rendered().unwrap();
        assert_eq!(board.messages.len(), 2);
        assert_eq!(board.messages[0].timestamp, ts(400));
        assert_eq!(board.total, 4);
    }
}
