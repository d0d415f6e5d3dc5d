//! Live lead feed: keeps one filtered, paginated page of leads consistent with
//! an unordered, at-least-once push stream.
//!
//! Events pass through the [`dedup::EventDeduplicator`], patch rows already on
//! screen via [`reconcile::upsert`], flag them in the
//! [`highlight::HighlightTracker`], and arm a coalesced re-sync
//! ([`refetch::CoalescingRefetch`]). [`live_view::LiveView`] owns all of it.

pub mod dedup;
pub mod highlight;
pub mod live_view;
pub mod reconcile;
pub mod refetch;

pub use dedup::EventDeduplicator;
pub use highlight::HighlightTracker;
pub use live_view::{
    FeedNotice, IngestReport, LiveView, LiveViewConfig, LiveViewError, TickReport, ViewSnapshot,
    MAX_PENDING_NOTICES,
};
pub use reconcile::{upsert, UpsertOutcome};
pub use refetch::{CoalescingRefetch, RefreshTicket, ThrottledRefresh};
