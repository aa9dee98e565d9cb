//! Staleness tracking across sync rounds.
//!
//! When a source fails a round, its events from the last successful fetch
//! are carried forward tagged `stale` instead of vanishing. A fatal round
//! (no events at all) leaves the previous snapshot untouched.

use chrono::{DateTime, Duration, Utc};

use calbar_core::{Event, merge};

use crate::syncer::SyncOutcome;

/// Holds the latest published events snapshot and the sync error state.
#[derive(Debug, Default)]
pub struct StalenessTracker {
    events: Vec<Event>,
    last_sync_at: Option<DateTime<Utc>>,
    last_sync_err: Option<String>,
}

impl StalenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.last_sync_at
    }

    pub fn last_sync_err(&self) -> Option<&str> {
        self.last_sync_err.as_deref()
    }

    /// Folds a sync outcome into the snapshot.
    ///
    /// Fatal rounds keep the prior events and record the error. Otherwise
    /// events of failed sources are retained from the prior snapshot and
    /// tagged stale, fresh events are tagged not-stale, and the two sets
    /// merge sorted.
    pub fn apply(&mut self, outcome: SyncOutcome, now: DateTime<Utc>) {
        if outcome.is_fatal() {
            self.last_sync_err = outcome.error.map(|e| e.to_string());
            return;
        }

        let carried: Vec<Event> = self
            .events
            .iter()
            .filter(|e| {
                outcome
                    .failed_sources
                    .iter()
                    .any(|failed| source_matches(&e.source, failed))
            })
            .cloned()
            .map(|mut e| {
                e.stale = true;
                e
            })
            .collect();

        let mut fresh = outcome.events;
        for e in &mut fresh {
            e.stale = false;
        }

        self.events = merge(vec![fresh, carried]);
        self.last_sync_at = Some(now);
        self.last_sync_err = None;
    }

    /// The overall staleness predicate the UI sees: the last sync failed
    /// outright, or no sync succeeded within two intervals.
    pub fn is_stale(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        if self.last_sync_err.is_some() {
            return true;
        }
        match self.last_sync_at {
            Some(at) => now - at > interval * 2,
            None => false,
        }
    }
}

/// Whether an event's source name belongs to a failed source. CalDAV
/// sub-calendars tag events `"{adapter}/{calendar}"`, so a failed adapter
/// name matches its sub-calendars by prefix.
fn source_matches(event_source: &str, failed: &str) -> bool {
    event_source == failed
        || event_source
            .strip_prefix(failed)
            .is_some_and(|rest| rest.starts_with('/'))
}
