//! Feed kind filter
//!
//! Toggles for which event kinds a feed includes. With nothing selected
//! the filter falls back to the long-standing default: everything except
//! votes.

use crate::error::{Error, Result};
use crate::types::ActivityKind;
use serde::{Deserialize, Serialize};

/// Which event kinds a feed build includes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedFilter {
    #[serde(default)]
    pub edits: bool,
    #[serde(default)]
    pub votes: bool,
    #[serde(default)]
    pub friend_events: bool,
    #[serde(default)]
    pub user_messages: bool,
    #[serde(default)]
    pub system_messages: bool,
}

impl FeedFilter {
    /// The default filter: no explicit selection, so every kind except
    /// votes passes.
    pub fn all() -> Self {
        FeedFilter::default()
    }

    /// A filter selecting exactly `kinds`.
    ///
    /// An empty list is rejected: an explicitly empty selection is a
    /// caller bug, not a request for the default.
    pub fn only(kinds: &[ActivityKind]) -> Result<Self> {
        if kinds.is_empty() {
            return Err(Error::InvalidFilter(
                "kind selection must not be empty".to_string(),
            ));
        }
        let mut filter = FeedFilter::default();
        for kind in kinds {
            match kind {
                ActivityKind::Edit => filter.edits = true,
                ActivityKind::Vote => filter.votes = true,
                ActivityKind::FriendAdded | ActivityKind::FoeAdded => filter.friend_events = true,
                ActivityKind::UserMessage => filter.user_messages = true,
                ActivityKind::SystemMessage => filter.system_messages = true,
            }
        }
        Ok(filter)
    }

    /// Whether any toggle is explicitly set
    pub fn is_default(&self) -> bool {
        !(self.edits
            || self.votes
            || self.friend_events
            || self.user_messages
            || self.system_messages)
    }

    /// Whether this filter passes `kind`
    pub fn allows(&self, kind: ActivityKind) -> bool {
        if self.is_default() {
            return kind != ActivityKind::Vote;
        }
        match kind {
            ActivityKind::Edit => self.edits,
            ActivityKind::Vote => self.votes,
            ActivityKind::FriendAdded | ActivityKind::FoeAdded => self.friend_events,
            ActivityKind::UserMessage => self.user_messages,
            ActivityKind::SystemMessage => self.system_messages,
        }
    }

    /// The kinds this filter passes, in fixed order
    pub fn kinds(&self) -> Vec<ActivityKind> {
        ActivityKind::ALL
            .iter()
            .copied()
            .filter(|k| self.allows(*k))
            .collect()
    }
}
