use lmc_core::Clock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(8);

/// Time-windowed idempotency filter over push-event keys.
///
/// Advisory only: it suppresses redundant UI churn for redelivered events and
/// must never be relied on for correctness. Memory is bounded by the traffic
/// seen in the last window as long as `purge` runs periodically.
pub struct EventDeduplicator {
    window: Duration,
    clock: Arc<dyn Clock>,
    first_seen: HashMap<String, Instant>,
}

impl EventDeduplicator {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            first_seen: HashMap::new(),
        }
    }

    /// `false` the first time a key shows up in a window, `true` after that.
    pub fn seen(&mut self, key: &str) -> bool {
        let now = self.clock.now();
        self.seen_at(key, now)
    }

    pub fn seen_at(&mut self, key: &str, now: Instant) -> bool {
        if let Some(first) = self.first_seen.get(key) {
            if now.saturating_duration_since(*first) < self.window {
                return true;
            }
        }
        self.first_seen.insert(key.to_string(), now);
        false
    }

    /// Drop keys whose window has elapsed. Returns how many were removed.
    pub fn purge(&mut self) -> usize {
        let now = self.clock.now();
        self.purge_at(now)
    }

    pub fn purge_at(&mut self, now: Instant) -> usize {
        let before = self.first_seen.len();
        let window = self.window;
        self.first_seen
            .retain(|_, first| now.saturating_duration_since(*first) < window);
        before - self.first_seen.len()
    }

    pub fn len(&self) -> usize {
        self.first_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first_seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lmc_core::ManualClock;

    fn dedup_with_clock() -> (EventDeduplicator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let dedup = EventDeduplicator::new(DEFAULT_DEDUP_WINDOW, clock.clone());
        (dedup, clock)
    }

    #[test]
    fn second_sighting_is_duplicate_until_window_elapses() {
        let (mut dedup, clock) = dedup_with_clock();

        assert!(!dedup.seen("lead_created:L-1"));
        assert!(dedup.seen("lead_created:L-1"));

        clock.advance(Duration::from_millis(7_999));
        assert!(dedup.seen("lead_created:L-1"));

        clock.advance(Duration::from_millis(1));
        assert!(!dedup.seen("lead_created:L-1"));
        assert!(dedup.seen("lead_created:L-1"));
    }

    #[test]
    fn keys_are_independent() {
        let (mut dedup, _clock) = dedup_with_clock();
        assert!(!dedup.seen("status_changed:L-1:booked"));
        assert!(!dedup.seen("status_changed:L-1:lost"));
        assert!(!dedup.seen("status_changed:L-2:booked"));
        assert_eq!(dedup.len(), 3);
    }

    #[test]
    fn purge_only_drops_expired_keys() {
        let (mut dedup, clock) = dedup_with_clock();
        dedup.seen("old");
        clock.advance(Duration::from_secs(5));
        dedup.seen("recent");

        clock.advance(Duration::from_secs(3));
        assert_eq!(dedup.purge(), 1);
        assert_eq!(dedup.len(), 1);
        assert!(dedup.seen("recent"));

        clock.advance(Duration::from_secs(8));
        assert_eq!(dedup.purge(), 1);
        assert!(dedup.is_empty());
    }
}
