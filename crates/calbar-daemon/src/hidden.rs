//! The ephemeral hidden-event registry.
//!
//! Hides are process-local and never persisted. Garbage collection runs
//! after every mutation and every sync so entries cannot outlive the
//! events they refer to.

use chrono::{DateTime, Duration, Utc};

use calbar_core::Event;

/// One hidden uid with its hide time. Entries are kept oldest-first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenEntry {
    pub uid: String,
    pub hidden_at: DateTime<Utc>,
}

/// The set of event uids the user has asked to suppress.
#[derive(Debug, Default)]
pub struct HiddenRegistry {
    entries: Vec<HiddenEntry>,
}

impl HiddenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hides a uid. A uid already hidden is left with its original
    /// `hidden_at`.
    pub fn hide(&mut self, uid: &str, now: DateTime<Utc>) {
        if self.contains(uid) {
            return;
        }
        self.entries.push(HiddenEntry {
            uid: uid.to_string(),
            hidden_at: now,
        });
    }

    /// Removes any entry for this uid.
    pub fn unhide(&mut self, uid: &str) {
        self.entries.retain(|e| e.uid != uid);
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.entries.iter().any(|e| e.uid == uid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Events not currently hidden, in input order.
    pub fn visible(&self, events: &[Event]) -> Vec<Event> {
        events
            .iter()
            .filter(|e| !self.contains(&e.uid))
            .cloned()
            .collect()
    }

    /// The hidden events, most recently hidden first.
    pub fn hidden(&self, events: &[Event]) -> Vec<Event> {
        let mut hidden: Vec<(DateTime<Utc>, Event)> = events
            .iter()
            .filter_map(|e| {
                self.entries
                    .iter()
                    .find(|entry| entry.uid == e.uid)
                    .map(|entry| (entry.hidden_at, e.clone()))
            })
            .collect();
        hidden.sort_by(|a, b| b.0.cmp(&a.0));
        hidden.into_iter().map(|(_, e)| e).collect()
    }

    /// Drops entries whose uid no longer appears in `events`, or whose
    /// event ended more than `event_end_grace` ago. Hides are transient;
    /// this keeps the set from leaking across weeks.
    pub fn gc(&mut self, events: &[Event], event_end_grace: Duration, now: DateTime<Utc>) {
        self.entries.retain(|entry| {
            events
                .iter()
                .find(|e| e.uid == entry.uid)
                .is_some_and(|e| e.end + event_end_grace >= now)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 17, h, min, 0).unwrap()
    }

    fn event(uid: &str, start_hour: u32) -> Event {
        let start = utc(start_hour, 0);
        Event::new(uid, uid.to_uppercase(), start, start + Duration::hours(1))
    }

    #[test]
    fn hide_and_unhide_roundtrip() {
        let mut registry = HiddenRegistry::new();
        let events = vec![event("a", 10), event("b", 11)];

        registry.hide("a", utc(9, 0));
        assert_eq!(registry.visible(&events).len(), 1);
        assert_eq!(registry.visible(&events)[0].uid, "b");

        registry.unhide("a");
        // hide then unhide is a no-op on the visible view.
        assert_eq!(registry.visible(&events).len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn double_hide_keeps_first_timestamp() {
        let mut registry = HiddenRegistry::new();
        registry.hide("a", utc(9, 0));
        registry.hide("a", utc(10, 0));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.entries[0].hidden_at, utc(9, 0));
    }

    #[test]
    fn hidden_ordered_newest_first() {
        let mut registry = HiddenRegistry::new();
        let events = vec![event("a", 10), event("b", 11), event("c", 12)];

        registry.hide("a", utc(9, 0));
        registry.hide("c", utc(9, 2));
        registry.hide("b", utc(9, 1));

        let hidden = registry.hidden(&events);
        let uids: Vec<_> = hidden.iter().map(|e| e.uid.as_str()).collect();
        assert_eq!(uids, vec!["c", "b", "a"]);
    }

    #[test]
    fn gc_drops_vanished_uid() {
        // Hide X, then the next sync no longer returns X;
        // after GC the hidden set is empty and the visible view unchanged.
        let mut registry = HiddenRegistry::new();
        registry.hide("x", utc(9, 0));

        let events = vec![event("a", 10)];
        registry.gc(&events, Duration::minutes(5), utc(9, 0));

        assert!(registry.is_empty());
        assert_eq!(registry.visible(&events).len(), 1);
    }

    #[test]
    fn gc_drops_long_ended_event() {
        let mut registry = HiddenRegistry::new();
        let events = vec![event("a", 8)]; // ends 09:00
        registry.hide("a", utc(8, 30));

        // Within grace: kept.
        registry.gc(&events, Duration::minutes(5), utc(9, 4));
        assert!(registry.contains("a"));

        // Past grace: dropped.
        registry.gc(&events, Duration::minutes(5), utc(9, 6));
        assert!(!registry.contains("a"));
    }

    #[test]
    fn gc_keeps_live_hidden_events() {
        let mut registry = HiddenRegistry::new();
        let events = vec![event("a", 10)];
        registry.hide("a", utc(9, 0));

        registry.gc(&events, Duration::minutes(5), utc(9, 30));
        assert!(registry.contains("a"));
    }
}
