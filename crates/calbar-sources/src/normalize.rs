//! iCalendar normalization: VEVENT components to [`Event`] values.
//!
//! Timezone policy: explicit timezones resolve through the IANA database,
//! floating times are interpreted in the process's local timezone, and
//! `VALUE=DATE` values parse as local midnight. Recurring components expand
//! here via their RRULE; servers that pre-expand (CalDAV time-range
//! queries, Graph calendarView) simply produce components without rules.

use std::str::FromStr;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{
    Calendar, CalendarComponent, CalendarDateTime, Component, DatePerhapsTime, Event as IcalEvent,
    EventLike,
};
use rrule::RRuleSet;
use thiserror::Error;
use tracing::debug;

use calbar_core::{Event, is_effectively_all_day};

use crate::error::{FetchError, FetchResult};

/// Upper bound on occurrences scanned per rule, against pathological rules
/// whose DTSTART lies far in the past.
const OCCURRENCE_SCAN_CAP: usize = 65_536;

/// Error for a single component that could not be normalized.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("component has no parseable start")]
    MissingStart,
    #[error("invalid recurrence rule: {0}")]
    BadRecurrence(String),
}

/// Parses a full iCalendar document and normalizes every VEVENT.
///
/// A document that fails to parse at all is a [`FetchError::Decode`];
/// individual components that fail normalization are skipped with a debug
/// log, matching the per-event error policy.
pub fn parse_feed(
    text: &str,
    source: &str,
    now: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> FetchResult<Vec<Event>> {
    let calendar: Calendar = text.parse().map_err(FetchError::Decode)?;

    let mut events = Vec::new();
    for component in calendar.iter() {
        if let CalendarComponent::Event(ev) = component {
            match expand_component(ev, source, now, window_end) {
                Ok(mut expanded) => events.append(&mut expanded),
                Err(err) => {
                    debug!(source = source, error = %err, "skipping unparseable event");
                }
            }
        }
    }
    Ok(events)
}

/// Normalizes one VEVENT, expanding recurrences into the window
/// `[now − duration, window_end]` (the lookback keeps an occurrence that
/// started before now but has not ended yet).
pub fn expand_component(
    ev: &IcalEvent,
    source: &str,
    now: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<Vec<Event>, NormalizeError> {
    let start = resolve(ev.get_start().ok_or(NormalizeError::MissingStart)?);

    let duration = match ev.get_end() {
        Some(end) => resolve(end).instant - start.instant,
        None => ev
            .property_value("DURATION")
            .and_then(parse_ical_duration)
            .unwrap_or_else(|| Duration::hours(1)),
    };

    let series_uid = ev.get_uid().unwrap_or_default().to_string();
    let base = Event {
        uid: series_uid.clone(),
        summary: ev.get_summary().unwrap_or_default().to_string(),
        description: ev.get_description().unwrap_or_default().to_string(),
        location: ev.get_location().unwrap_or_default().to_string(),
        organizer: strip_mailto(ev.property_value("ORGANIZER").unwrap_or_default()),
        url: ev.property_value("URL").unwrap_or_default().to_string(),
        source: source.to_string(),
        start: start.instant,
        end: start.instant + duration,
        all_day: false,
        stale: false,
    };

    let Some(rrule) = ev.property_value("RRULE") else {
        let mut event = base;
        event.all_day = start.is_date || is_effectively_all_day(event.start, event.end);
        return Ok(vec![event]);
    };

    // EXDATE may appear once or as a repeated property.
    let mut exdates: Vec<DateTime<Utc>> = Vec::new();
    if let Some(value) = ev.property_value("EXDATE") {
        exdates.extend(parse_exdates(value));
    }
    if let Some(props) = ev.multi_properties().get("EXDATE") {
        for prop in props {
            exdates.extend(parse_exdates(prop.value()));
        }
    }

    let range_start = now - duration;
    let starts = expand_rrule(rrule, &exdates, start.instant, range_start, window_end)
        .map_err(NormalizeError::BadRecurrence)?;

    Ok(starts
        .into_iter()
        .map(|occ_start| {
            let mut event = base.clone();
            event.start = occ_start;
            event.end = occ_start + duration;
            event.uid = format!("{}_{}", series_uid, occ_start.timestamp());
            event.all_day = start.is_date || is_effectively_all_day(event.start, event.end);
            event
        })
        .collect())
}

struct ResolvedTime {
    instant: DateTime<Utc>,
    /// The value was date-only, which marks the event explicitly all-day.
    is_date: bool,
}

fn resolve(value: DatePerhapsTime) -> ResolvedTime {
    match value {
        DatePerhapsTime::Date(date) => ResolvedTime {
            instant: local_naive_to_utc(date.and_hms_opt(0, 0, 0).expect("midnight")),
            is_date: true,
        },
        DatePerhapsTime::DateTime(cdt) => ResolvedTime {
            instant: resolve_datetime(cdt),
            is_date: false,
        },
    }
}

fn resolve_datetime(cdt: CalendarDateTime) -> DateTime<Utc> {
    match cdt {
        CalendarDateTime::Utc(dt) => dt,
        CalendarDateTime::Floating(naive) => local_naive_to_utc(naive),
        CalendarDateTime::WithTimezone { date_time, tzid } => match Tz::from_str(&tzid) {
            Ok(tz) => tz
                .from_local_datetime(&date_time)
                .earliest()
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&date_time)),
            // Unknown TZID degrades to floating-time handling.
            Err(_) => local_naive_to_utc(date_time),
        },
    }
}

fn local_naive_to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

fn strip_mailto(organizer: &str) -> String {
    organizer
        .strip_prefix("mailto:")
        .unwrap_or(organizer)
        .to_string()
}

/// Parses an iCalendar DURATION value (`PT1H30M`, `P2D`, `P1W`).
fn parse_ical_duration(value: &str) -> Option<Duration> {
    let trimmed = value.trim().trim_start_matches('+');
    if trimmed.starts_with('-') {
        return None;
    }
    let parsed = iso8601::duration(trimmed).ok()?;
    let std: std::time::Duration = parsed.into();
    Duration::from_std(std).ok()
}

/// Parses EXDATE values (comma separated) into UTC instants.
fn parse_exdates(value: &str) -> Vec<DateTime<Utc>> {
    value
        .split(',')
        .filter_map(|token| {
            let token = token.trim();
            if let Some(stripped) = token.strip_suffix('Z') {
                NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|n| Utc.from_utc_datetime(&n))
            } else if let Ok(naive) = NaiveDateTime::parse_from_str(token, "%Y%m%dT%H%M%S") {
                Some(local_naive_to_utc(naive))
            } else if let Ok(date) = NaiveDate::parse_from_str(token, "%Y%m%d") {
                Some(local_naive_to_utc(date.and_hms_opt(0, 0, 0)?))
            } else {
                None
            }
        })
        .collect()
}

/// Expands a recurrence rule to occurrence starts within
/// `[range_start, range_end]`, boundaries inclusive.
fn expand_rrule(
    rrule: &str,
    exdates: &[DateTime<Utc>],
    series_start: DateTime<Utc>,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>, String> {
    let mut input = format!(
        "DTSTART:{}\nRRULE:{}\n",
        series_start.format("%Y%m%dT%H%M%SZ"),
        rrule
    );
    for ex in exdates {
        input.push_str(&format!("EXDATE:{}\n", ex.format("%Y%m%dT%H%M%SZ")));
    }

    let rset = RRuleSet::from_str(&input).map_err(|e| e.to_string())?;

    let mut starts = Vec::new();
    for occurrence in rset.into_iter().take(OCCURRENCE_SCAN_CAP) {
        let start = occurrence.to_utc();
        if start > range_end {
            break;
        }
        if start < range_start {
            continue;
        }
        starts.push(start);
    }
    Ok(starts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(y, m, d, h, min, s)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn feed(body: &str) -> String {
        format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//EN\r\n{}\r\nEND:VCALENDAR\r\n",
            body
        )
    }

    fn parse(body: &str, now: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Event> {
        parse_feed(&feed(body), "test", now, end).unwrap()
    }

    #[test]
    fn basic_timed_event() {
        let body = "BEGIN:VEVENT\r\n\
                    UID:meet-1@example.com\r\n\
                    DTSTART:20260217T100000Z\r\n\
                    DTEND:20260217T110000Z\r\n\
                    SUMMARY:Team Meeting\r\n\
                    DESCRIPTION:Weekly sync\r\n\
                    LOCATION:Room 4\r\n\
                    ORGANIZER:mailto:boss@co.com\r\n\
                    URL:https://example.com/meet\r\n\
                    END:VEVENT";
        let events = parse(body, utc(2026, 2, 17, 0, 0, 0), utc(2026, 3, 1, 0, 0, 0));

        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.uid, "meet-1@example.com");
        assert_eq!(e.summary, "Team Meeting");
        assert_eq!(e.description, "Weekly sync");
        assert_eq!(e.location, "Room 4");
        assert_eq!(e.organizer, "boss@co.com");
        assert_eq!(e.url, "https://example.com/meet");
        assert_eq!(e.source, "test");
        assert_eq!(e.start, utc(2026, 2, 17, 10, 0, 0));
        assert_eq!(e.end, utc(2026, 2, 17, 11, 0, 0));
        assert!(!e.all_day);
        assert!(!e.stale);
    }

    #[test]
    fn explicit_all_day_event() {
        let body = "BEGIN:VEVENT\r\n\
                    UID:holiday@example.com\r\n\
                    DTSTART;VALUE=DATE:20260217\r\n\
                    DTEND;VALUE=DATE:20260218\r\n\
                    SUMMARY:Holiday\r\n\
                    END:VEVENT";
        let events = parse(body, utc(2026, 2, 16, 0, 0, 0), utc(2026, 3, 1, 0, 0, 0));

        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert!(e.all_day);
        assert_eq!(e.start, local(2026, 2, 17, 0, 0, 0));
        assert_eq!(e.end, local(2026, 2, 18, 0, 0, 0));
    }

    #[test]
    fn effectively_all_day_from_floating_midnights() {
        // iCloud-style block: floating local midnight to midnight over five
        // days, exported as a timed event.
        let body = "BEGIN:VEVENT\r\n\
                    UID:block@example.com\r\n\
                    DTSTART:20260216T000000\r\n\
                    DTEND:20260221T000000\r\n\
                    SUMMARY:Offsite\r\n\
                    END:VEVENT";
        let events = parse(body, utc(2026, 2, 16, 0, 0, 0), utc(2026, 3, 1, 0, 0, 0));

        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert!(e.all_day);
        assert_eq!(e.start, local(2026, 2, 16, 0, 0, 0));
        assert_eq!(e.end, local(2026, 2, 21, 0, 0, 0));
    }

    #[test]
    fn duration_fallback_is_one_hour() {
        let body = "BEGIN:VEVENT\r\n\
                    UID:short@example.com\r\n\
                    DTSTART:20260217T100000Z\r\n\
                    SUMMARY:Quick chat\r\n\
                    END:VEVENT";
        let events = parse(body, utc(2026, 2, 17, 0, 0, 0), utc(2026, 3, 1, 0, 0, 0));
        assert_eq!(events[0].end - events[0].start, Duration::hours(1));
    }

    #[test]
    fn duration_property_is_parsed() {
        let body = "BEGIN:VEVENT\r\n\
                    UID:timed@example.com\r\n\
                    DTSTART:20260217T100000Z\r\n\
                    DURATION:PT30M\r\n\
                    SUMMARY:Half hour\r\n\
                    END:VEVENT";
        let events = parse(body, utc(2026, 2, 17, 0, 0, 0), utc(2026, 3, 1, 0, 0, 0));
        assert_eq!(events[0].end - events[0].start, Duration::minutes(30));
    }

    #[test]
    fn missing_start_skips_component() {
        let body = "BEGIN:VEVENT\r\n\
                    UID:broken@example.com\r\n\
                    SUMMARY:No time\r\n\
                    END:VEVENT\r\n\
                    BEGIN:VEVENT\r\n\
                    UID:fine@example.com\r\n\
                    DTSTART:20260217T100000Z\r\n\
                    SUMMARY:Fine\r\n\
                    END:VEVENT";
        let events = parse(body, utc(2026, 2, 17, 0, 0, 0), utc(2026, 3, 1, 0, 0, 0));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].uid, "fine@example.com");
    }

    #[test]
    fn daily_recurrence_expansion() {
        // A daily rule starting Feb 17 10:00, 1 h duration,
        // window end Feb 20 00:00 → three occurrences with rewritten uids.
        let body = "BEGIN:VEVENT\r\n\
                    UID:daily@example.com\r\n\
                    DTSTART:20260217T100000Z\r\n\
                    DTEND:20260217T110000Z\r\n\
                    RRULE:FREQ=DAILY\r\n\
                    SUMMARY:Standup\r\n\
                    END:VEVENT";
        let events = parse(body, utc(2026, 2, 17, 9, 0, 0), utc(2026, 2, 20, 0, 0, 0));

        assert_eq!(events.len(), 3);
        for (i, e) in events.iter().enumerate() {
            let expected = utc(2026, 2, 17 + i as u32, 10, 0, 0);
            assert_eq!(e.start, expected);
            assert_eq!(e.end, expected + Duration::hours(1));
            assert_eq!(e.uid, format!("daily@example.com_{}", expected.timestamp()));
            assert_eq!(e.summary, "Standup");
        }
    }

    #[test]
    fn recurrence_lookback_keeps_ongoing_occurrence() {
        // Two-hour daily event; at 11:00 the 10:00 occurrence is still
        // running and must be produced.
        let body = "BEGIN:VEVENT\r\n\
                    UID:long@example.com\r\n\
                    DTSTART:20260210T100000Z\r\n\
                    DTEND:20260210T120000Z\r\n\
                    RRULE:FREQ=DAILY\r\n\
                    SUMMARY:Workshop\r\n\
                    END:VEVENT";
        let events = parse(body, utc(2026, 2, 17, 11, 0, 0), utc(2026, 2, 18, 0, 0, 0));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start, utc(2026, 2, 17, 10, 0, 0));
    }

    #[test]
    fn recurrence_respects_exdate() {
        let body = "BEGIN:VEVENT\r\n\
                    UID:gap@example.com\r\n\
                    DTSTART:20260217T100000Z\r\n\
                    DTEND:20260217T110000Z\r\n\
                    RRULE:FREQ=DAILY\r\n\
                    EXDATE:20260218T100000Z\r\n\
                    SUMMARY:Standup\r\n\
                    END:VEVENT";
        let events = parse(body, utc(2026, 2, 17, 9, 0, 0), utc(2026, 2, 20, 0, 0, 0));

        let starts: Vec<_> = events.iter().map(|e| e.start).collect();
        assert_eq!(
            starts,
            vec![utc(2026, 2, 17, 10, 0, 0), utc(2026, 2, 19, 10, 0, 0)]
        );
    }

    #[test]
    fn recurrence_boundary_is_inclusive() {
        // An occurrence exactly at the window end is produced.
        let body = "BEGIN:VEVENT\r\n\
                    UID:edge@example.com\r\n\
                    DTSTART:20260217T000000Z\r\n\
                    DTEND:20260217T010000Z\r\n\
                    RRULE:FREQ=DAILY\r\n\
                    SUMMARY:Edge\r\n\
                    END:VEVENT";
        let events = parse(body, utc(2026, 2, 17, 0, 0, 0), utc(2026, 2, 19, 0, 0, 0));
        let starts: Vec<_> = events.iter().map(|e| e.start).collect();
        assert!(starts.contains(&utc(2026, 2, 19, 0, 0, 0)));
    }

    #[test]
    fn all_day_reevaluated_per_occurrence() {
        let body = "BEGIN:VEVENT\r\n\
                    UID:days@example.com\r\n\
                    DTSTART;VALUE=DATE:20260217\r\n\
                    DTEND;VALUE=DATE:20260218\r\n\
                    RRULE:FREQ=WEEKLY\r\n\
                    SUMMARY:Weekly day\r\n\
                    END:VEVENT";
        let events = parse(body, local(2026, 2, 17, 0, 0, 0), local(2026, 3, 5, 0, 0, 0));
        assert!(!events.is_empty());
        assert!(events.iter().all(|e| e.all_day));
        assert!(events.iter().all(|e| e.uid.starts_with("days@example.com_")));
    }

    #[test]
    fn garbage_feed_is_decode_error() {
        let result = parse_feed("not a calendar", "test", Utc::now(), Utc::now());
        assert!(matches!(result, Err(FetchError::Decode(_))));
    }

    #[test]
    fn ical_duration_values() {
        assert_eq!(parse_ical_duration("PT1H30M"), Some(Duration::minutes(90)));
        assert_eq!(parse_ical_duration("P2D"), Some(Duration::days(2)));
        assert_eq!(parse_ical_duration("P1W"), Some(Duration::weeks(1)));
        assert_eq!(parse_ical_duration("-PT1H"), None);
        assert_eq!(parse_ical_duration("bogus"), None);
    }
}
