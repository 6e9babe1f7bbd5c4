//! Per-person recognition cooldown.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Suppresses repeat ledger writes for a person inside a time window.
///
/// State is process-local and starts empty, so the first sighting after a
/// restart is never suppressed. Callers mark a person seen only after the
/// ledger append succeeded; a failed write must not start a window.
#[derive(Debug)]
pub struct CooldownTracker {
    window: Duration,
    last_recorded: HashMap<String, DateTime<Utc>>,
}

impl CooldownTracker {
    pub fn new(window: Duration) -> Self {
        Self { window, last_recorded: HashMap::new() }
    }

    /// True when `person_id` was recorded strictly less than one window ago.
    ///
    /// An elapsed time exactly equal to the window is no longer suppressed.
    pub fn should_suppress(&self, person_id: &str, now: DateTime<Utc>) -> bool {
        match self.last_recorded.get(person_id) {
            Some(&last) => now - last < self.window,
            None => false,
        }
    }

    /// Mark a successful recording for `person_id` at `now`.
    pub fn record_seen(&mut self, person_id: &str, now: DateTime<Utc>) {
        self.last_recorded.insert(person_id.to_string(), now);
    }

    /// Number of people currently tracked.
    pub fn len(&self) -> usize {
        self.last_recorded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_recorded.is_empty()
    }
}
