//! Presentation-agnostic view building.
//!
//! [`build_view`] is a pure function from a state snapshot to the [`View`]
//! consumed by any UI surface: timed events grouped by local day, the
//! all-day events spanning today, the hidden list, and a status. All
//! day-boundary logic evaluates in the process's local timezone.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::time::format_duration;

/// Overall freshness of the published data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// No sync has completed yet.
    Loading,
    /// Data is current.
    Fresh,
    /// A visible event starts within 15 minutes.
    Imminent,
    /// The last sync failed or data is overdue.
    Stale,
}

/// A timed event plus its precomputed display strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub event: Event,
    /// `"Now (12m left)"`, `"in 5m"`, or a local `"HH:MM"`.
    pub time_indicator: String,
    /// Compact duration, e.g. `"45m"` or `"1.5h"`.
    pub duration_label: String,
}

/// Timed events for one local day.
///
/// The `Today` group is always present when any timed events exist; an
/// empty `events` list there means "No more events today".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayGroup {
    pub label: String,
    pub events: Vec<TimedEvent>,
}

/// The snapshot published to UI surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    /// Timed events grouped by local day, days ascending.
    pub days: Vec<DayGroup>,
    /// All-day events spanning today, sorted by summary.
    pub all_day: Vec<Event>,
    /// Hidden events, most recently hidden first.
    pub hidden: Vec<Event>,
    pub status: Status,
    pub last_sync_at: Option<DateTime<Utc>>,
    /// One-line summary of the next event, for tray tooltips.
    pub next_event: String,
}

impl View {
    /// The initial view before any sync has completed.
    pub fn loading() -> Self {
        Self {
            days: Vec::new(),
            all_day: Vec::new(),
            hidden: Vec::new(),
            status: Status::Loading,
            last_sync_at: None,
            next_event: "No upcoming events".to_string(),
        }
    }
}

/// Builds a view from an event snapshot.
///
/// `hidden` is the hidden list (already ordered newest-first by the
/// registry). Events past their grace window or beyond the horizon are
/// dropped; the remainder partitions into the all-day section (all-day or
/// ≥24 h events spanning today) and per-day timed groups.
pub fn build_view(
    events: &[Event],
    hidden: &[Event],
    status: Status,
    last_sync_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    time_range: Duration,
    event_end_grace: Duration,
) -> View {
    let cutoff = now + time_range;
    let today = now.with_timezone(&Local).date_naive();

    let mut timed: Vec<&Event> = Vec::new();
    let mut all_day: Vec<Event> = Vec::new();

    for e in events {
        if e.end + event_end_grace < now {
            continue;
        }
        if e.start > cutoff {
            continue;
        }

        if e.all_day || e.duration() >= Duration::hours(24) {
            if spans_local_day(e, today) {
                all_day.push(e.clone());
            }
        } else {
            timed.push(e);
        }
    }

    timed.sort_by_key(|e| e.start);
    all_day.sort_by(|a, b| a.summary.cmp(&b.summary));

    let mut days: Vec<DayGroup> = Vec::new();
    if !timed.is_empty() {
        // Today leads even when empty, so surfaces can render a
        // "No more events today" placeholder.
        days.push(DayGroup {
            label: "Today".to_string(),
            events: Vec::new(),
        });
    }
    for e in &timed {
        let label = day_label(e.start, now);
        let entry = timed_entry(e, now);
        if days.last().is_some_and(|group| group.label == label) {
            days.last_mut().expect("group exists").events.push(entry);
        } else if label == "Today" {
            // Timed events are sorted, so Today events land in the leading
            // group.
            days[0].events.push(entry);
        } else {
            days.push(DayGroup {
                label,
                events: vec![entry],
            });
        }
    }

    View {
        next_event: next_event_line(&timed, now),
        days,
        all_day,
        hidden: hidden.to_vec(),
        status,
        last_sync_at,
    }
}

fn timed_entry(e: &Event, now: DateTime<Utc>) -> TimedEvent {
    TimedEvent {
        event: e.clone(),
        time_indicator: time_indicator(e, now),
        duration_label: format_duration(e.duration()),
    }
}

/// True when the event covers `today`, using inclusive start day and
/// exclusive end day with end-midnight snapping.
fn spans_local_day(e: &Event, today: NaiveDate) -> bool {
    let start_day = e.start.with_timezone(&Local).date_naive();
    let end_day = e.end.with_timezone(&Local).date_naive();
    start_day <= today && today < end_day
}

/// Local-day label: `Today`, `Tomorrow`, or `"Mon, Feb 16"`.
pub fn day_label(start: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let event_day = start.with_timezone(&Local).date_naive();
    let today = now.with_timezone(&Local).date_naive();

    if event_day == today {
        "Today".to_string()
    } else if Some(event_day) == today.succ_opt() {
        "Tomorrow".to_string()
    } else {
        start.with_timezone(&Local).format("%a, %b %-d").to_string()
    }
}

/// Per-event time indicator for list rows.
pub fn time_indicator(e: &Event, now: DateTime<Utc>) -> String {
    if e.is_ongoing_at(now) {
        let remaining = e.end - now;
        if remaining < Duration::hours(1) {
            return format!("Now ({}m left)", remaining.num_minutes());
        }
        return format!(
            "Now ({:.1}h left)",
            remaining.num_minutes() as f64 / 60.0
        );
    }

    let starts_in = e.start - now;
    if starts_in > Duration::zero() && starts_in <= Duration::minutes(15) {
        return format!("in {}m", starts_in.num_minutes());
    }
    e.start.with_timezone(&Local).format("%H:%M").to_string()
}

/// Renders the date span of a multi-day all-day event, e.g.
/// `"Feb 16 – Feb 20"` (the last visible day is `end − 1 day`). Returns an
/// empty string for single-day events. Days adjacent to now use relative
/// labels (`"Today – Tomorrow"`).
pub fn format_all_day_range(e: &Event, now: DateTime<Utc>) -> String {
    let start_day = e.start.with_timezone(&Local).date_naive();
    let last_day = (e.end - Duration::days(1)).with_timezone(&Local).date_naive();

    if last_day <= start_day {
        return String::new();
    }

    format!(
        "{} – {}",
        relative_day(start_day, now),
        relative_day(last_day, now)
    )
}

fn relative_day(day: NaiveDate, now: DateTime<Utc>) -> String {
    let today = now.with_timezone(&Local).date_naive();
    if day == today {
        "Today".to_string()
    } else if Some(day) == today.succ_opt() {
        "Tomorrow".to_string()
    } else {
        format!("{} {}", month_abbrev(day.month()), day.day())
    }
}

fn month_abbrev(month: u32) -> &'static str {
    match month {
        1 => "Jan",
        2 => "Feb",
        3 => "Mar",
        4 => "Apr",
        5 => "May",
        6 => "Jun",
        7 => "Jul",
        8 => "Aug",
        9 => "Sep",
        10 => "Oct",
        11 => "Nov",
        _ => "Dec",
    }
}

/// One-line next-event summary for tray tooltips.
fn next_event_line(timed: &[&Event], now: DateTime<Utc>) -> String {
    for e in timed {
        if e.end < now {
            continue;
        }
        let starts_in = e.start - now;
        let when = if starts_in <= Duration::zero() {
            "Now".to_string()
        } else if starts_in < Duration::hours(1) {
            format!("in {} min", starts_in.num_minutes())
        } else {
            e.start.with_timezone(&Local).format("%H:%M").to_string()
        };
        return format!("{} - {}", e.summary, when);
    }
    "No upcoming events".to_string()
}

/// Derives the published status from the current state.
///
/// `loading` holds until the first sync completes; `stale` reflects the
/// staleness predicate; otherwise a visible timed event starting within 15
/// minutes makes the view `imminent`.
pub fn derive_status(loading: bool, stale: bool, events: &[Event], now: DateTime<Utc>) -> Status {
    if loading {
        return Status::Loading;
    }
    if stale {
        return Status::Stale;
    }
    let imminent = events
        .iter()
        .any(|e| !e.all_day && e.is_upcoming(now, Duration::minutes(15)));
    if imminent {
        Status::Imminent
    } else {
        Status::Fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn timed(uid: &str, start: DateTime<Utc>, hours: i64) -> Event {
        Event::new(uid, uid.to_uppercase(), start, start + Duration::hours(hours))
    }

    fn all_day(uid: &str, start: DateTime<Utc>, days: i64) -> Event {
        Event::new(uid, uid.to_uppercase(), start, start + Duration::days(days))
            .with_all_day(true)
    }

    fn build(events: &[Event], now: DateTime<Utc>) -> View {
        build_view(
            events,
            &[],
            Status::Fresh,
            Some(now),
            now,
            Duration::days(7),
            Duration::minutes(5),
        )
    }

    #[test]
    fn drops_past_and_far_future_events() {
        let now = local(2026, 2, 17, 12, 0);
        let events = vec![
            timed("past", local(2026, 2, 17, 9, 0), 1), // ended 10:00, grace 5m
            timed("future", local(2026, 2, 25, 9, 0), 1), // beyond 7d horizon
            timed("ok", local(2026, 2, 17, 14, 0), 1),
        ];
        let view = build(&events, now);

        let uids: Vec<_> = view
            .days
            .iter()
            .flat_map(|d| d.events.iter().map(|t| t.event.uid.clone()))
            .collect();
        assert_eq!(uids, vec!["ok"]);
    }

    #[test]
    fn grace_keeps_recently_ended_events() {
        let now = local(2026, 2, 17, 12, 3);
        // Ended at 12:00; still inside the 5 minute grace.
        let events = vec![timed("recent", local(2026, 2, 17, 11, 0), 1)];
        let view = build(&events, now);
        assert_eq!(view.days.len(), 1);
        assert_eq!(view.days[0].events.len(), 1);
        assert_eq!(view.days[0].events[0].duration_label, "1h");
    }

    #[test]
    fn groups_by_day_with_leading_today() {
        let now = local(2026, 2, 17, 8, 0);
        let events = vec![
            timed("a", local(2026, 2, 17, 10, 0), 1),
            timed("b", local(2026, 2, 18, 10, 0), 1),
            timed("c", local(2026, 2, 20, 10, 0), 1),
        ];
        let view = build(&events, now);

        let labels: Vec<_> = view.days.iter().map(|d| d.label.clone()).collect();
        assert_eq!(labels[0], "Today");
        assert_eq!(labels[1], "Tomorrow");
        assert!(labels[2].contains("Feb 20"));
    }

    #[test]
    fn empty_today_group_emitted_as_placeholder() {
        let now = local(2026, 2, 17, 8, 0);
        let events = vec![timed("b", local(2026, 2, 18, 10, 0), 1)];
        let view = build(&events, now);

        assert_eq!(view.days[0].label, "Today");
        assert!(view.days[0].events.is_empty());
        assert_eq!(view.days[1].label, "Tomorrow");
    }

    #[test]
    fn no_groups_without_any_timed_events() {
        let now = local(2026, 2, 17, 8, 0);
        let view = build(&[], now);
        assert!(view.days.is_empty());
    }

    #[test]
    fn all_day_section_spans_today_only() {
        let now = local(2026, 2, 17, 8, 0);
        let events = vec![
            all_day("current", local(2026, 2, 16, 0, 0), 5), // 16th..20th
            all_day("past", local(2026, 2, 10, 0, 0), 2),    // over
            all_day("future", local(2026, 2, 19, 0, 0), 1),  // not yet
        ];
        let view = build(&events, now);
        let uids: Vec<_> = view.all_day.iter().map(|e| e.uid.clone()).collect();
        assert_eq!(uids, vec!["current"]);
    }

    #[test]
    fn long_timed_event_lands_in_all_day_section() {
        let now = local(2026, 2, 17, 8, 0);
        // 48h timed block covering today.
        let events = vec![timed("offsite", local(2026, 2, 16, 0, 0), 48)];
        let view = build(&events, now);
        assert!(view.days.is_empty());
        assert_eq!(view.all_day.len(), 1);
    }

    #[test]
    fn all_day_sorted_alphabetically() {
        let now = local(2026, 2, 17, 8, 0);
        let mut zebra = all_day("z", local(2026, 2, 17, 0, 0), 1);
        zebra.summary = "Zebra".into();
        let mut apple = all_day("a", local(2026, 2, 17, 0, 0), 1);
        apple.summary = "Apple".into();

        let view = build(&[zebra, apple], now);
        let names: Vec<_> = view.all_day.iter().map(|e| e.summary.clone()).collect();
        assert_eq!(names, vec!["Apple", "Zebra"]);
    }

    #[test]
    fn time_indicator_ongoing() {
        let now = local(2026, 2, 17, 10, 30);
        let e = timed("a", local(2026, 2, 17, 10, 0), 1);
        assert_eq!(time_indicator(&e, now), "Now (30m left)");

        let long = timed("b", local(2026, 2, 17, 10, 0), 3);
        assert_eq!(time_indicator(&long, now), "Now (2.5h left)");
    }

    #[test]
    fn time_indicator_soon_and_clock() {
        let now = local(2026, 2, 17, 10, 0);
        let soon = timed("a", local(2026, 2, 17, 10, 10), 1);
        assert_eq!(time_indicator(&soon, now), "in 10m");

        let later = timed("b", local(2026, 2, 17, 14, 30), 1);
        assert_eq!(time_indicator(&later, now), "14:30");
    }

    #[test]
    fn time_indicator_start_equals_now_is_ongoing() {
        let now = local(2026, 2, 17, 10, 0);
        let e = timed("a", now, 1);
        assert!(time_indicator(&e, now).starts_with("Now"));
    }

    #[test]
    fn all_day_range_multi_day() {
        let now = local(2026, 2, 17, 10, 0);
        // Feb 16 00:00 .. Feb 21 00:00 renders last visible
        // day Feb 20.
        let e = all_day("a", local(2026, 2, 16, 0, 0), 5);
        assert_eq!(format_all_day_range(&e, now), "Feb 16 – Feb 20");
    }

    #[test]
    fn all_day_range_single_day_is_empty() {
        let now = local(2026, 2, 17, 10, 0);
        let e = all_day("a", local(2026, 2, 17, 0, 0), 1);
        assert_eq!(format_all_day_range(&e, now), "");
    }

    #[test]
    fn all_day_range_relative_labels() {
        let now = local(2026, 2, 17, 10, 0);
        let e = all_day("a", local(2026, 2, 17, 0, 0), 2);
        assert_eq!(format_all_day_range(&e, now), "Today – Tomorrow");
    }

    #[test]
    fn status_precedence() {
        let now = local(2026, 2, 17, 10, 0);
        let soon = vec![timed("a", local(2026, 2, 17, 10, 10), 1)];

        assert_eq!(derive_status(true, false, &soon, now), Status::Loading);
        assert_eq!(derive_status(false, true, &soon, now), Status::Stale);
        assert_eq!(derive_status(false, false, &soon, now), Status::Imminent);

        let later = vec![timed("a", local(2026, 2, 17, 16, 0), 1)];
        assert_eq!(derive_status(false, false, &later, now), Status::Fresh);
    }

    #[test]
    fn next_event_line_formats() {
        let now = local(2026, 2, 17, 10, 0);

        let ongoing = vec![timed("a", local(2026, 2, 17, 9, 30), 1)];
        let view = build(&ongoing, now);
        assert_eq!(view.next_event, "A - Now");

        let soon = vec![timed("a", local(2026, 2, 17, 10, 20), 1)];
        let view = build(&soon, now);
        assert_eq!(view.next_event, "A - in 20 min");

        let view = build(&[], now);
        assert_eq!(view.next_event, "No upcoming events");
    }

    #[test]
    fn hidden_passed_through() {
        let now = local(2026, 2, 17, 10, 0);
        let hidden = vec![timed("h", local(2026, 2, 17, 12, 0), 1)];
        let view = build_view(
            &[],
            &hidden,
            Status::Fresh,
            None,
            now,
            Duration::days(7),
            Duration::minutes(5),
        );
        assert_eq!(view.hidden.len(), 1);
        assert_eq!(view.hidden[0].uid, "h");
    }
}
