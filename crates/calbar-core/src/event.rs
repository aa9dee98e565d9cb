//! The common calendar event record.
//!
//! Every source adapter normalizes its wire format into [`Event`]. All
//! instants are stored in UTC; presentation layers convert to local time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A calendar event from any source, after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier, stable per event instance. Expanded recurrence
    /// occurrences carry `"{series_uid}_{start_unix_seconds}"`.
    pub uid: String,
    /// Event title.
    pub summary: String,
    /// Full description/body.
    pub description: String,
    /// Location text (may contain meeting URLs).
    pub location: String,
    /// Organizer email, with any leading `mailto:` stripped.
    pub organizer: String,
    /// URL associated with the event, if any.
    pub url: String,
    /// Name of the originating source. CalDAV sub-calendars append
    /// `/calendarName`.
    pub source: String,
    /// When the event begins.
    pub start: DateTime<Utc>,
    /// When the event ends. For all-day events this is the exclusive
    /// midnight following the last visible day.
    pub end: DateTime<Utc>,
    /// Whether this is an all-day event (explicit or derived).
    pub all_day: bool,
    /// Set when the event was carried forward from a prior successful fetch
    /// because the source failed this round. Never set by adapters.
    #[serde(default)]
    pub stale: bool,
}

impl Event {
    /// Creates an event with the required fields; the rest default to empty.
    pub fn new(
        uid: impl Into<String>,
        summary: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            uid: uid.into(),
            summary: summary.into(),
            description: String::new(),
            location: String::new(),
            organizer: String::new(),
            url: String::new(),
            source: String::new(),
            start,
            end,
            all_day: false,
            stale: false,
        }
    }

    /// Builder method to set the source name.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Builder method to set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Builder method to set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder method to set the organizer.
    pub fn with_organizer(mut self, organizer: impl Into<String>) -> Self {
        self.organizer = organizer.into();
        self
    }

    /// Builder method to set the event URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Builder method to mark the event all-day.
    pub fn with_all_day(mut self, all_day: bool) -> Self {
        self.all_day = all_day;
        self
    }

    /// The duration of the event.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// True if the event is happening at `now`.
    ///
    /// The interval is half-open: an event whose start equals `now` is
    /// ongoing, one whose end equals `now` is past.
    pub fn is_ongoing_at(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now < self.end
    }

    /// True if the event starts within `within` of `now` (exclusive of
    /// already-started events).
    pub fn is_upcoming(&self, now: DateTime<Utc>, within: Duration) -> bool {
        let until = self.start - now;
        until > Duration::zero() && until <= within
    }

    /// How long until the event starts (negative if already started).
    pub fn starts_in(&self, now: DateTime<Utc>) -> Duration {
        self.start - now
    }
}

/// Combines events from multiple sources into a single slice, sorted
/// ascending by start time.
pub fn merge(event_sets: Vec<Vec<Event>>) -> Vec<Event> {
    let mut all: Vec<Event> = event_sets.into_iter().flatten().collect();
    all.sort_by_key(|e| e.start);
    all
}
