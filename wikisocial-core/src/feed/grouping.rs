//! Adjacency grouping and window boundaries
//!
//! Consecutive feed items sharing (kind, actor) form one display group.
//! The feed keeps every record and annotates group boundaries instead of
//! collapsing, so presenters can render "N edits by X" or each item
//! individually without losing data.
//!
//! The boundary marker always lands on the last item of the delivered
//! window, whether the window was cut by a cap or simply ran out of
//! events. The host platform's rendering skipped the marker when the
//! event count landed exactly on the cap; that off-by-one is fixed here.

use crate::types::{FeedItem, GroupMark};

/// Annotate group membership in a single pass.
///
/// An item joins the group of its predecessor iff both share kind and
/// actor. Pure function of the item sequence: re-running it on already
/// annotated items produces identical marks.
pub fn annotate_groups(items: &mut [FeedItem]) {
    let len = items.len();
    for i in 0..len {
        let same_as_prev = i > 0 && same_group(&items[i - 1], &items[i]);
        let same_as_next = i + 1 < len && same_group(&items[i], &items[i + 1]);
        items[i].group = GroupMark {
            first: !same_as_prev,
            last: !same_as_next,
        };
    }
}

fn same_group(a: &FeedItem, b: &FeedItem) -> bool {
    a.item.kind() == b.item.kind() && a.item.actor_id == b.item.actor_id
}

/// Mark the last item of the delivered window as the boundary.
pub fn mark_boundary(items: &mut [FeedItem]) {
    for item in items.iter_mut() {
        item.boundary = false;
    }
    if let Some(last) = items.last_mut() {
        last.boundary = true;
    }
}

/// Where interior styling ends: `min(limit, len)`.
pub fn style_boundary(limit: usize, len: usize) -> usize {
    limit.min(len)
}
