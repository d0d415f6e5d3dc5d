use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_HIGHLIGHT_DURATION: Duration = Duration::from_millis(2_500);

/// Leads flagged as recently changed, each with its own expiry.
///
/// Re-marking a lead replaces its expiry instead of adding a second one, so
/// exactly one expiry is reported per highlight, at the latest deadline.
#[derive(Debug, Clone)]
pub struct HighlightTracker {
    duration: Duration,
    expires_at: HashMap<String, Instant>,
}

impl HighlightTracker {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            expires_at: HashMap::new(),
        }
    }

    pub fn mark_changed(&mut self, lead_id: &str, now: Instant) {
        self.expires_at
            .insert(lead_id.to_string(), now + self.duration);
    }

    pub fn is_highlighted(&self, lead_id: &str) -> bool {
        self.expires_at.contains_key(lead_id)
    }

    /// Remove and return every lead whose highlight has run out, oldest first.
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        let mut expired = self
            .expires_at
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, deadline)| (*deadline, id.clone()))
            .collect::<Vec<_>>();
        expired.sort();
        for (_, id) in &expired {
            self.expires_at.remove(id);
        }
        expired.into_iter().map(|(_, id)| id).collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.expires_at.values().min().copied()
    }

    pub fn highlighted(&self) -> Vec<&str> {
        let mut ids = self.expires_at.keys().map(String::as_str).collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }
}
