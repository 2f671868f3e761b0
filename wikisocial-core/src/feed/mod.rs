//! Activity feed aggregation
//!
//! Turns the raw event log into the ordered, filtered, grouped, capped
//! feed a presenter renders. The pipeline runs once per request:
//!
//! ```text
//! Requested -> Filtered -> Aggregated -> Capped -> Delivered
//!                  |            |           |
//!                  +---- store error -------+---> Failed (degraded feed)
//! ```
//!
//! Post-fetch stages operate on data already in hand and cannot fail;
//! only the store fetch can, and that degrades to an empty feed with a
//! signal instead of failing the page.

mod aggregator;
mod filter;
mod grouping;

pub use aggregator::{ActivityAggregator, FeedRequest};
pub use filter::FeedFilter;
pub use grouping::{annotate_groups, mark_boundary, style_boundary};

/// Lifecycle phase of one feed build, for structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    Requested,
    Filtered,
    Aggregated,
    Capped,
    Delivered,
    Failed,
}

impl FeedPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedPhase::Requested => "requested",
            FeedPhase::Filtered => "filtered",
            FeedPhase::Aggregated => "aggregated",
            FeedPhase::Capped => "capped",
            FeedPhase::Delivered => "delivered",
            FeedPhase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for FeedPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
