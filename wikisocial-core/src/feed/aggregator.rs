//! Feed aggregator
//!
//! Builds one [`ActivityFeed`] per request: fetch raw events for the
//! scope's actor set, filter by kind, sort newest first, apply the hard
//! cap, gate against the viewer, apply the display limit, annotate
//! groups and boundaries.
//!
//! The two cutoffs are deliberately separate knobs: `hard_cap` bounds
//! what the aggregator keeps of the sorted event stream, `display_limit`
//! bounds the gated window the presenter shows. Truncation always
//! happens after sorting.

use crate::config::FeedConfig;
use crate::error::{Error, Result};
use crate::feed::filter::FeedFilter;
use crate::feed::grouping::{annotate_groups, mark_boundary, style_boundary};
use crate::feed::FeedPhase;
use crate::relationship::RelationshipService;
use crate::store::ActivityStore;
use crate::types::{ActivityFeed, ActorId, Deadline, FeedItem, FeedScope, GroupMark, Viewer};
use crate::visibility::can_view_item;
use std::sync::Arc;

/// One feed build request.
#[derive(Debug, Clone, Copy)]
pub struct FeedRequest {
    /// Whose profile the feed is for
    pub owner: ActorId,
    /// Who is looking; drives gating
    pub viewer: Viewer,
    /// Owner's own events or the owner's network
    pub scope: FeedScope,
    /// Kind filter
    pub filter: FeedFilter,
    /// Display window override; `None` uses the configured limit
    pub display_limit: Option<usize>,
    /// Budget for collaborator calls
    pub deadline: Deadline,
}

impl FeedRequest {
    /// A request with the usual profile-page defaults: owner scope,
    /// default filter, configured limit, no deadline.
    pub fn new(owner: ActorId, viewer: Viewer) -> Self {
        FeedRequest {
            owner,
            viewer,
            scope: FeedScope::Owner,
            filter: FeedFilter::all(),
            display_limit: None,
            deadline: Deadline::UNBOUNDED,
        }
    }
}

/// Merges raw events into ordered, capped, typed feeds.
pub struct ActivityAggregator {
    store: Arc<dyn ActivityStore>,
    relationships: Arc<RelationshipService>,
    config: FeedConfig,
}

impl ActivityAggregator {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        relationships: Arc<RelationshipService>,
        config: FeedConfig,
    ) -> Self {
        ActivityAggregator {
            store,
            relationships,
            config,
        }
    }

    /// Build the feed for `request`.
    ///
    /// Hard errors are limited to invalid requests. A store that is
    /// unreachable or out of deadline budget yields an empty feed
    /// carrying a [`FeedSignal::SourceUnavailable`](crate::types::FeedSignal)
    /// so the rest of the page still renders.
    pub fn build_feed(&self, request: &FeedRequest) -> Result<ActivityFeed> {
        let display_limit = request.display_limit.unwrap_or(self.config.display_limit);
        if display_limit == 0 {
            return Err(Error::InvalidFilter(
                "display limit must be greater than zero".to_string(),
            ));
        }
        tracing::debug!(
            phase = %FeedPhase::Requested,
            owner = %request.owner,
            scope = ?request.scope,
            display_limit,
            "building feed"
        );

        // Resolve the actor set. Network scope goes through the cached
        // relationship service.
        let actors = match request.scope {
            FeedScope::Owner => vec![request.owner],
            FeedScope::Network(rel_type) => {
                match self.relationships.network_actors(
                    request.owner,
                    rel_type,
                    self.config.network_fanout,
                ) {
                    Ok(actors) => actors,
                    Err(e) if e.is_recoverable() => {
                        return Ok(self.degraded(display_limit, &e));
                    }
                    Err(e) => return Err(e),
                }
            }
        };
        if actors.is_empty() {
            // empty network, nothing to fetch; not a degradation
            tracing::debug!(phase = %FeedPhase::Delivered, owner = %request.owner, "empty network");
            return Ok(ActivityFeed::empty(display_limit));
        }

        if request.deadline.expired() {
            return Ok(self.degraded(
                display_limit,
                &Error::unavailable("activity store", "request deadline expired"),
            ));
        }

        let raw = match self.store.query(&actors, None, request.deadline) {
            Ok(raw) => raw,
            Err(e) if e.is_recoverable() => return Ok(self.degraded(display_limit, &e)),
            Err(e) => return Err(e),
        };

        // Kind filter.
        let mut items: Vec<_> = raw
            .into_iter()
            .filter(|item| request.filter.allows(item.kind()))
            .collect();
        let total_count = items.len();
        tracing::debug!(
            phase = %FeedPhase::Filtered,
            owner = %request.owner,
            total = total_count,
            "kind filter applied"
        );

        // Sort newest first. Stable, so equal timestamps keep the
        // store's retrieval order.
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        tracing::debug!(phase = %FeedPhase::Aggregated, owner = %request.owner, "sorted");

        // Hard cap on the sorted stream; truncation never precedes the
        // sort.
        let mut truncated = items.len() > self.config.hard_cap;
        items.truncate(self.config.hard_cap);

        // Gate against the viewer, then cut the display window. Order
        // matters: a hidden item must not consume a visible slot, but it
        // already counted toward total_count above.
        items.retain(|item| can_view_item(item, request.viewer));
        truncated |= items.len() > display_limit;
        items.truncate(display_limit);
        tracing::debug!(
            phase = %FeedPhase::Capped,
            owner = %request.owner,
            shown = items.len(),
            truncated,
            "window applied"
        );

        let mut feed_items: Vec<FeedItem> = items
            .into_iter()
            .map(|item| FeedItem {
                item,
                group: GroupMark::solo(),
                boundary: false,
            })
            .collect();
        annotate_groups(&mut feed_items);
        mark_boundary(&mut feed_items);

        let feed = ActivityFeed {
            style_boundary: style_boundary(display_limit, feed_items.len()),
            items: feed_items,
            display_limit,
            total_count,
            truncated,
            signal: None,
        };
        tracing::debug!(
            phase = %FeedPhase::Delivered,
            owner = %request.owner,
            shown = feed.len(),
            total = feed.total_count,
            "feed delivered"
        );
        Ok(feed)
    }

    fn degraded(&self, display_limit: usize, error: &Error) -> ActivityFeed {
        tracing::warn!(phase = %FeedPhase::Failed, error = %error, "feed degraded to empty");
        ActivityFeed::degraded(display_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationship::MemoryRelationshipCache;
    use crate::store::MemoryStore;
    use crate::types::{ActivityItem, ActivityKind, ActivityPayload, FeedSignal, RelationshipType};
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn harness() -> (Arc<MemoryStore>, ActivityAggregator) {
        harness_with(FeedConfig::default())
    }

    fn harness_with(config: FeedConfig) -> (Arc<MemoryStore>, ActivityAggregator) {
        let store = Arc::new(MemoryStore::new());
        let relationships = Arc::new(RelationshipService::new(
            store.clone(),
            Arc::new(MemoryRelationshipCache::new()),
        ));
        let aggregator = ActivityAggregator::new(store.clone(), relationships, config);
        (store, aggregator)
    }

    fn push_edit(store: &MemoryStore, actor: u64, at: i64) {
        store.push_activity(ActivityItem {
            actor_id: ActorId(actor),
            timestamp: ts(at),
            payload: ActivityPayload::Edit {
                page: None,
                summary: None,
            },
        });
    }

    #[test]
    fn feed_is_sorted_descending_and_capped_to_most_recent() {
        let (store, aggregator) = harness();
        // insert out of order
        for at in [300, 100, 500, 200, 400] {
            push_edit(&store, 1, at);
        }

        let mut request = FeedRequest::new(ActorId(1), Viewer::Anonymous);
        request.display_limit = Some(3);
        let feed = aggregator.build_feed(&request).unwrap();

        let times: Vec<_> = feed.items.iter().map(|i| i.item.timestamp).collect();
        assert_eq!(times, vec![ts(500), ts(400), ts(300)]);
        assert_eq!(feed.total_count, 5);
        assert!(feed.truncated);
        assert!(feed.has_more());
    }

    #[test]
    fn forty_five_edits_limit_eight_marks_the_eighth_item() {
        let (store, aggregator) = harness();
        for at in 1..=45 {
            push_edit(&store, 1, at);
        }

        let request = FeedRequest::new(ActorId(1), Viewer::Anonymous);
        let feed = aggregator.build_feed(&request).unwrap();

        assert_eq!(feed.len(), 8);
        assert!(feed.items.iter().all(|i| i.item.kind() == ActivityKind::Edit));
        // newest first
        assert_eq!(feed.items[0].item.timestamp, ts(45));
        assert_eq!(feed.items[7].item.timestamp, ts(38));
        // the 8th item carries the boundary marker and closes the style window
        assert!(feed.items[7].boundary);
        assert!(feed.items[..7].iter().all(|i| !i.boundary));
        assert_eq!(feed.style_boundary, 8);
        assert_eq!(feed.total_count, 45);
    }

    #[test]
    fn equal_timestamps_keep_retrieval_order_and_group() {
        let (store, aggregator) = harness();
        for other in [10, 11, 12] {
            store.push_activity(ActivityItem {
                actor_id: ActorId(1),
                timestamp: ts(200),
                payload: ActivityPayload::FriendAdded {
                    other: ActorId(other),
                },
            });
        }
        push_edit(&store, 1, 100);

        let mut request = FeedRequest::new(ActorId(1), Viewer::Anonymous);
        request.display_limit = Some(10);
        let feed = aggregator.build_feed(&request).unwrap();

        assert_eq!(feed.len(), 4);
        let others: Vec<_> = feed.items[..3]
            .iter()
            .map(|i| match &i.item.payload {
                ActivityPayload::FriendAdded { other } => other.0,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(others, vec![10, 11, 12]);
        assert_eq!(feed.items[3].item.kind(), ActivityKind::Edit);

        // the 3 friend events form one group, the edit stands alone
        assert_eq!(feed.items[0].group, GroupMark { first: true, last: false });
        assert_eq!(feed.items[1].group, GroupMark { first: false, last: false });
        assert_eq!(feed.items[2].group, GroupMark { first: false, last: true });
        assert_eq!(feed.items[3].group, GroupMark::solo());
    }

    #[test]
    fn hard_cap_boundary_is_correct_at_and_around_the_cap() {
        // exactly at the cap, one below, and one above all mark the last
        // delivered item
        for (events, expect_len) in [(40usize, 40usize), (39, 39), (41, 40)] {
            let config = FeedConfig {
                display_limit: 40,
                hard_cap: 40,
                ..FeedConfig::default()
            };
            let (store, aggregator) = harness_with(config);
            for at in 1..=events as i64 {
                push_edit(&store, 1, at);
            }

            let request = FeedRequest::new(ActorId(1), Viewer::Anonymous);
            let feed = aggregator.build_feed(&request).unwrap();
            assert_eq!(feed.len(), expect_len, "{} events", events);
            assert!(feed.items[expect_len - 1].boundary, "{} events", events);
            assert_eq!(
                feed.items.iter().filter(|i| i.boundary).count(),
                1,
                "{} events",
                events
            );
            assert_eq!(feed.truncated, events > 40, "{} events", events);
        }
    }

    #[test]
    fn kind_filter_applies_before_grouping() {
        let (store, aggregator) = harness();
        push_edit(&store, 1, 400);
        store.push_activity(ActivityItem {
            actor_id: ActorId(1),
            timestamp: ts(300),
            payload: ActivityPayload::SystemMessage {
                comment: "award".to_string(),
            },
        });
        push_edit(&store, 1, 200);

        let mut request = FeedRequest::new(ActorId(1), Viewer::Anonymous);
        request.filter = FeedFilter::only(&[ActivityKind::Edit]).unwrap();
        let feed = aggregator.build_feed(&request).unwrap();

        // with the system message filtered out, the two edits become
        // adjacent; groups never span a removed item's position because
        // grouping runs on the filtered sequence
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.items[0].group, GroupMark { first: true, last: false });
        assert_eq!(feed.items[1].group, GroupMark { first: false, last: true });
        assert_eq!(feed.total_count, 2);
    }

    #[test]
    fn default_filter_excludes_votes() {
        let (store, aggregator) = harness();
        store.push_activity(ActivityItem {
            actor_id: ActorId(1),
            timestamp: ts(100),
            payload: ActivityPayload::Vote { page: None },
        });
        push_edit(&store, 1, 200);

        let feed = aggregator
            .build_feed(&FeedRequest::new(ActorId(1), Viewer::Anonymous))
            .unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed.items[0].item.kind(), ActivityKind::Edit);
    }

    #[test]
    fn gated_items_do_not_consume_visible_slots_but_count_in_totals() {
        let (store, aggregator) = harness();
        // 3 private messages newer than 2 public edits
        for at in [500, 400, 300] {
            store.push_activity(ActivityItem {
                actor_id: ActorId(1),
                timestamp: ts(at),
                payload: ActivityPayload::UserMessage {
                    to: ActorId(2),
                    comment: "psst".to_string(),
                    private: true,
                },
            });
        }
        push_edit(&store, 1, 200);
        push_edit(&store, 1, 100);

        let mut request = FeedRequest::new(ActorId(1), Viewer::Actor(ActorId(9)));
        request.display_limit = Some(2);
        let feed = aggregator.build_feed(&request).unwrap();

        // both edits fill the window; the hidden messages took no slots
        assert_eq!(feed.len(), 2);
        assert!(feed.items.iter().all(|i| i.item.kind() == ActivityKind::Edit));
        // but they still count toward the view-all threshold
        assert_eq!(feed.total_count, 5);

        // a participant sees them
        let mut request = FeedRequest::new(ActorId(1), Viewer::Actor(ActorId(2)));
        request.display_limit = Some(2);
        let feed = aggregator.build_feed(&request).unwrap();
        assert_eq!(feed.items[0].item.kind(), ActivityKind::UserMessage);
    }

    #[test]
    fn network_scope_pulls_friends_events() {
        let (store, aggregator) = harness();
        store.add_relationship(ActorId(1), ActorId(2), RelationshipType::Friend, ts(10));
        store.add_relationship(ActorId(1), ActorId(3), RelationshipType::Friend, ts(20));
        push_edit(&store, 2, 100);
        push_edit(&store, 3, 200);
        push_edit(&store, 4, 300); // not a friend

        let mut request = FeedRequest::new(ActorId(1), Viewer::Anonymous);
        request.scope = FeedScope::Network(RelationshipType::Friend);
        let feed = aggregator.build_feed(&request).unwrap();

        assert_eq!(feed.len(), 2);
        assert_eq!(feed.items[0].item.actor_id, ActorId(3));
        assert_eq!(feed.items[1].item.actor_id, ActorId(2));
    }

    #[test]
    fn empty_network_yields_empty_feed_without_signal() {
        let (_, aggregator) = harness();
        let mut request = FeedRequest::new(ActorId(1), Viewer::Anonymous);
        request.scope = FeedScope::Network(RelationshipType::Friend);
        let feed = aggregator.build_feed(&request).unwrap();
        assert!(feed.is_empty());
        assert_eq!(feed.signal, None);
    }

    #[test]
    fn unreachable_store_degrades_with_signal() {
        let (store, aggregator) = harness();
        push_edit(&store, 1, 100);
        store.set_unavailable(true);

        let feed = aggregator
            .build_feed(&FeedRequest::new(ActorId(1), Viewer::Anonymous))
            .unwrap();
        assert!(feed.is_empty());
        assert_eq!(feed.signal, Some(FeedSignal::SourceUnavailable));
        assert_eq!(feed.display_limit, 8);
    }

    #[test]
    fn expired_deadline_degrades_with_signal() {
        let (store, aggregator) = harness();
        push_edit(&store, 1, 100);

        let mut request = FeedRequest::new(ActorId(1), Viewer::Anonymous);
        request.deadline = Deadline::after(std::time::Duration::ZERO);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let feed = aggregator.build_feed(&request).unwrap();
        assert_eq!(feed.signal, Some(FeedSignal::SourceUnavailable));
    }

    #[test]
    fn zero_limit_is_rejected_not_clamped() {
        let (_, aggregator) = harness();
        let mut request = FeedRequest::new(ActorId(1), Viewer::Anonymous);
        request.display_limit = Some(0);
        let err = aggregator.build_feed(&request).unwrap_err();
        assert!(matches!(err, Error::InvalidFilter(_)));
    }
}
