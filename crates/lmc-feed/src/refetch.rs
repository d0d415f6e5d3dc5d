use std::time::Duration;
use tokio::time::Instant;

pub const LIST_COALESCE_WINDOW: Duration = Duration::from_millis(2_000);
pub const DASHBOARD_COALESCE_WINDOW: Duration = Duration::from_millis(1_200);
pub const DEFAULT_REFRESH_SPACING: Duration = Duration::from_millis(1_000);

/// Collapses bursts of invalidations into one trailing re-sync.
///
/// The first `invalidate` arms a deadline one window out; later calls join the
/// pending deadline instead of pushing it back, so a steady event stream still
/// gets a fetch at least once per window.
#[derive(Debug, Clone)]
pub struct CoalescingRefetch {
    window: Duration,
    due_at: Option<Instant>,
    coalesced: u32,
}

impl CoalescingRefetch {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            due_at: None,
            coalesced: 0,
        }
    }

    pub fn invalidate(&mut self, now: Instant) {
        match self.due_at {
            Some(_) => self.coalesced = self.coalesced.saturating_add(1),
            None => {
                self.due_at = Some(now + self.window);
                self.coalesced = 1;
            }
        }
    }

    pub fn due_at(&self) -> Option<Instant> {
        self.due_at
    }

    pub fn is_pending(&self) -> bool {
        self.due_at.is_some()
    }

    /// Number of invalidations folded into the pending fetch.
    pub fn coalesced(&self) -> u32 {
        self.coalesced
    }

    /// `true` exactly once per armed deadline, when it has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.due_at {
            Some(due) if due <= now => {
                self.due_at = None;
                self.coalesced = 0;
                true
            }
            _ => false,
        }
    }

    /// Drop any pending fetch, e.g. after a full reload made it redundant.
    pub fn cancel(&mut self) {
        self.due_at = None;
        self.coalesced = 0;
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct RefreshTicket {
    started_at: Instant,
}

impl RefreshTicket {
    pub fn started_at(&self) -> Instant {
        self.started_at
    }
}

/// Rate limiter for immediate refreshes: enforces a minimum spacing between
/// granted refreshes and drops requests while one is still in flight.
#[derive(Debug, Clone)]
pub struct ThrottledRefresh {
    min_spacing: Duration,
    last_started: Option<Instant>,
    in_flight: bool,
}

impl ThrottledRefresh {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last_started: None,
            in_flight: false,
        }
    }

    pub fn try_begin(&mut self, now: Instant) -> Option<RefreshTicket> {
        if self.in_flight {
            return None;
        }
        if let Some(last) = self.last_started {
            if now.saturating_duration_since(last) < self.min_spacing {
                return None;
            }
        }
        self.in_flight = true;
        self.last_started = Some(now);
        Some(RefreshTicket { started_at: now })
    }

    pub fn finish(&mut self, _ticket: RefreshTicket) {
        self.in_flight = false;
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }
}
