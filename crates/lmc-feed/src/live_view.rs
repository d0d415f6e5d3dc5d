use crate::dedup::{EventDeduplicator, DEFAULT_DEDUP_WINDOW};
use crate::highlight::{HighlightTracker, DEFAULT_HIGHLIGHT_DURATION};
use crate::reconcile::{upsert, UpsertOutcome};
use crate::refetch::{
    CoalescingRefetch, ThrottledRefresh, DASHBOARD_COALESCE_WINDOW, DEFAULT_REFRESH_SPACING,
    LIST_COALESCE_WINDOW,
};
use lmc_core::{
    ApiError, BulkUpdateResult, Clock, Lead, LeadApi, LeadPage, LeadUpdates, PageQuery, PushEvent,
};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const MAX_PENDING_NOTICES: usize = 64;

#[derive(Debug, Error)]
pub enum LiveViewError {
    #[error("lead api error: {0}")]
    Api(#[from] ApiError),
    #[error("bulk update reported failure for {requested} leads")]
    BulkRejected { requested: usize },
    #[error("bulk update needs at least one lead and one change")]
    NothingToUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveViewConfig {
    pub dedup_window: Duration,
    pub highlight_duration: Duration,
    pub coalesce_window: Duration,
    pub refresh_spacing: Duration,
    pub purge_interval: Duration,
}

impl LiveViewConfig {
    /// Leads table and callers list.
    pub fn list() -> Self {
        Self {
            dedup_window: DEFAULT_DEDUP_WINDOW,
            highlight_duration: DEFAULT_HIGHLIGHT_DURATION,
            coalesce_window: LIST_COALESCE_WINDOW,
            refresh_spacing: DEFAULT_REFRESH_SPACING,
            purge_interval: DEFAULT_DEDUP_WINDOW,
        }
    }

    pub fn dashboard() -> Self {
        Self {
            coalesce_window: DASHBOARD_COALESCE_WINDOW,
            ..Self::list()
        }
    }
}

impl Default for LiveViewConfig {
    fn default() -> Self {
        Self::list()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedNotice {
    NewLead {
        lead_id: String,
        name: Option<String>,
    },
    ResyncFailed {
        message: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub duplicate: bool,
    pub patched: Vec<String>,
    pub deferred: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub expired: Vec<String>,
    pub purged: usize,
    pub refetched: bool,
}

/// What a renderer needs from a live view, published after every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    pub leads: Vec<Lead>,
    pub total: u64,
    pub total_pages: u32,
    pub highlighted: Vec<String>,
    pub resync_pending: bool,
}

/// One live, filtered page of leads kept consistent with the push feed.
///
/// The page is written only by a full fetch or by a reconciler patch, and both
/// happen on whichever task owns the view, so edits and pushes never race.
pub struct LiveView<A> {
    api: A,
    query: PageQuery,
    config: LiveViewConfig,
    clock: Arc<dyn Clock>,
    page: LeadPage,
    dedup: EventDeduplicator,
    highlights: HighlightTracker,
    refetch: CoalescingRefetch,
    throttle: ThrottledRefresh,
    notices: VecDeque<FeedNotice>,
    notice_tx: broadcast::Sender<FeedNotice>,
    next_purge: Instant,
    snapshots: watch::Sender<ViewSnapshot>,
}

impl<A: LeadApi> LiveView<A> {
    pub fn new(api: A, query: PageQuery, config: LiveViewConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let (snapshots, _) = watch::channel(ViewSnapshot::default());
        let (notice_tx, _) = broadcast::channel(MAX_PENDING_NOTICES);
        Self {
            api,
            query,
            dedup: EventDeduplicator::new(config.dedup_window, clock.clone()),
            highlights: HighlightTracker::new(config.highlight_duration),
            refetch: CoalescingRefetch::new(config.coalesce_window),
            throttle: ThrottledRefresh::new(config.refresh_spacing),
            next_purge: now + config.purge_interval,
            config,
            clock,
            page: LeadPage::default(),
            notices: VecDeque::new(),
            notice_tx,
            snapshots,
        }
    }

    pub fn page(&self) -> &LeadPage {
        &self.page
    }

    pub fn leads(&self) -> &[Lead] {
        &self.page.leads
    }

    pub fn is_highlighted(&self, lead_id: &str) -> bool {
        self.highlights.is_highlighted(lead_id)
    }

    pub fn resync_pending(&self) -> bool {
        self.refetch.is_pending()
    }

    /// Notices not yet taken, oldest first. At most
    /// [`MAX_PENDING_NOTICES`] are kept.
    pub fn drain_notices(&mut self) -> Vec<FeedNotice> {
        self.notices.drain(..).collect()
    }

    /// Live notices while the view runs on its own task. A receiver that
    /// falls behind skips to the newest notices.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<FeedNotice> {
        self.notice_tx.subscribe()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            leads: self.page.leads.clone(),
            total: self.page.total,
            total_pages: self.page.total_pages,
            highlighted: self
                .highlights
                .highlighted()
                .into_iter()
                .map(str::to_string)
                .collect(),
            resync_pending: self.refetch.is_pending(),
        }
    }

    /// Replace the page with fresh server truth.
    pub async fn load(&mut self) -> Result<(), LiveViewError> {
        let page = self.api.fetch_page(&self.query).await?;
        info!(
            event = "feed_page_loaded",
            page = self.query.page,
            rows = page.leads.len(),
            total = page.total
        );
        self.page = page;
        self.refetch.cancel();
        self.publish();
        Ok(())
    }

    /// Apply one push event.
    ///
    /// A repeated dedupe key only suppresses the toast and the highlight of
    /// rows it did not change. The patch is still applied and a re-sync is
    /// still armed, since distinct changes can share a key.
    pub fn ingest(&mut self, event: &PushEvent) -> IngestReport {
        let now = self.clock.now();
        let key = event.dedupe_key();
        let duplicate = self.dedup.seen_at(&key, now);
        if duplicate {
            debug!(event = "feed_duplicate_seen", key = %key);
        }

        let mut report = IngestReport {
            duplicate,
            ..IngestReport::default()
        };
        for patch in event.patches() {
            match upsert(&mut self.page, &patch) {
                UpsertOutcome::Patched { changed } => {
                    if changed || !duplicate {
                        self.highlights.mark_changed(&patch.id, now);
                    }
                    debug!(event = "feed_row_patched", lead_id = %patch.id, changed);
                    report.patched.push(patch.id);
                }
                UpsertOutcome::NotVisible => {
                    debug!(event = "feed_row_deferred", lead_id = %patch.id);
                    report.deferred.push(patch.id);
                }
            }
        }

        if !duplicate && event.kind().is_arrival() {
            if let Some(patch) = event.patches().into_iter().next() {
                let name = patch
                    .field_data
                    .iter()
                    .find(|field| matches!(field.name.as_str(), "full_name" | "name"))
                    .and_then(|field| field.values.first().cloned());
                self.notify(FeedNotice::NewLead {
                    lead_id: patch.id,
                    name,
                });
            }
        }

        self.refetch.invalidate(now);
        self.publish();
        report
    }

    /// Run every timer that has come due: highlight expiry, seen-table purge,
    /// and the coalesced re-sync.
    pub async fn tick(&mut self) -> Result<TickReport, LiveViewError> {
        let now = self.clock.now();
        let mut report = TickReport {
            expired: self.highlights.expire(now),
            ..TickReport::default()
        };

        if now >= self.next_purge {
            report.purged = self.dedup.purge_at(now);
            self.next_purge = now + self.config.purge_interval;
            if report.purged > 0 {
                debug!(event = "feed_seen_purged", purged = report.purged, kept = self.dedup.len());
            }
        }

        let coalesced = self.refetch.coalesced();
        if self.refetch.take_due(now) {
            info!(event = "feed_refetch_fired", coalesced);
            if let Err(err) = self.load().await {
                warn!(event = "feed_refetch_failed", error = %err);
                self.notify(FeedNotice::ResyncFailed {
                    message: err.to_string(),
                });
                self.publish();
                return Err(err);
            }
            report.refetched = true;
        } else if !report.expired.is_empty() {
            self.publish();
        }

        Ok(report)
    }

    /// Immediate refresh, rate limited. Returns `false` when the call was
    /// dropped because a refresh is in flight or one started too recently.
    pub async fn refresh_now(&mut self) -> Result<bool, LiveViewError> {
        let Some(ticket) = self.throttle.try_begin(self.clock.now()) else {
            debug!(event = "feed_refresh_throttled");
            return Ok(false);
        };
        let result = self.load().await;
        self.throttle.finish(ticket);
        result.map(|_| true)
    }

    /// Bulk edit from the sidebar: server first, then patch the visible rows
    /// and schedule a re-sync for everything else.
    pub async fn bulk_update(
        &mut self,
        lead_ids: &[String],
        updates: &LeadUpdates,
    ) -> Result<BulkUpdateResult, LiveViewError> {
        if lead_ids.is_empty() || updates.is_empty() {
            return Err(LiveViewError::NothingToUpdate);
        }
        let result = self.api.bulk_update(lead_ids, updates).await?;
        if !result.success {
            return Err(LiveViewError::BulkRejected {
                requested: lead_ids.len(),
            });
        }

        let now = self.clock.now();
        let mut patched = 0usize;
        for lead_id in lead_ids {
            if let UpsertOutcome::Patched { .. } = upsert(&mut self.page, &updates.to_patch(lead_id)) {
                self.highlights.mark_changed(lead_id, now);
                patched += 1;
            }
        }
        info!(
            event = "feed_bulk_update",
            requested = lead_ids.len(),
            updated = result.count,
            patched
        );
        self.refetch.invalidate(now);
        self.publish();
        Ok(result)
    }

    /// Earliest instant at which `tick` has work to do.
    pub fn next_wakeup(&self) -> Instant {
        [self.refetch.due_at(), self.highlights.next_deadline()]
            .into_iter()
            .flatten()
            .fold(self.next_purge, Instant::min)
    }

    /// Own the view on the current task until `shutdown` flips to true.
    ///
    /// Push events, timers and fetches are handled strictly one at a time. A
    /// closed event channel stops intake but timers keep running so pending
    /// re-syncs and highlight expiries still land.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<PushEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Self {
        let mut events_open = true;
        info!(event = "feed_view_start", page = self.query.page, filters = self.query.filters.len());
        loop {
            let wake = self.next_wakeup();
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = events.recv(), if events_open => {
                    match received {
                        Some(event) => {
                            self.ingest(&event);
                        }
                        None => {
                            debug!(event = "feed_transport_closed");
                            events_open = false;
                        }
                    }
                }
                _ = tokio::time::sleep_until(wake) => {
                    if let Err(err) = self.tick().await {
                        warn!(event = "feed_tick_error", error = %err);
                    }
                }
            }
        }
        info!(event = "feed_view_stop");
        self
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    fn notify(&mut self, notice: FeedNotice) {
        // No live subscriber is fine; the pending list still has it.
        let _ = self.notice_tx.send(notice.clone());
        if self.notices.len() == MAX_PENDING_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(notice);
    }
}
