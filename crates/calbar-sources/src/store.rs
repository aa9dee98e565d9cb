//! On-disk ICS publication of the merged event stream.
//!
//! When `sync.output` is configured, each successful sync writes the merged
//! events to a single VCALENDAR file (temp file then rename, so readers
//! never see a partial write). The per-event source name travels in an
//! `X-CALBAR-SOURCE` property so a read-back restores it.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Local, Utc};
use icalendar::{
    Calendar, CalendarComponent, Component, Event as IcalEvent, EventLike, Property, ValueType,
};
use thiserror::Error;
use tracing::debug;

use calbar_core::{Event, merge};

use crate::normalize::expand_component;

const SOURCE_PROP: &str = "X-CALBAR-SOURCE";

/// Errors from reading or writing the published ICS file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode: {0}")]
    Decode(String),
}

/// Writes events to `path` atomically.
pub fn write_ics(path: &Path, events: &[Event]) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let mut calendar = Calendar::new();
    for event in events {
        calendar.push(to_component(event));
    }
    let calendar = calendar.done();

    let tmp = path.with_extension("ics.tmp");
    fs::write(&tmp, calendar.to_string())?;
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }

    debug!(path = %path.display(), count = events.len(), "wrote calendar file");
    Ok(())
}

/// Reads events back from a published ICS file, sorted by start.
pub fn read_ics(path: &Path) -> Result<Vec<Event>, StoreError> {
    let text = fs::read_to_string(path)?;
    parse_ics(&text)
}

/// Parses a published ICS document. Components that fail to normalize are
/// skipped, matching the per-event decode policy.
pub fn parse_ics(text: &str) -> Result<Vec<Event>, StoreError> {
    let calendar: Calendar = text.parse().map_err(StoreError::Decode)?;

    // Published files never carry recurrence rules, so the expansion window
    // is irrelevant; cover everything.
    let now = DateTime::<Utc>::MIN_UTC;
    let window_end = DateTime::<Utc>::MAX_UTC;

    let mut events = Vec::new();
    for component in calendar.iter() {
        if let CalendarComponent::Event(ev) = component {
            let source = ev.property_value(SOURCE_PROP).unwrap_or_default().to_string();
            if let Ok(parsed) = expand_component(ev, &source, now, window_end) {
                events.extend(parsed);
            }
        }
    }

    Ok(merge(vec![events]))
}

fn to_component(event: &Event) -> IcalEvent {
    let mut comp = IcalEvent::new();
    comp.uid(&event.uid);
    comp.summary(&event.summary);
    let dtstamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
    comp.add_property("DTSTAMP", dtstamp.as_str());

    if !event.description.is_empty() {
        comp.description(&event.description);
    }
    if !event.location.is_empty() {
        comp.location(&event.location);
    }
    if !event.url.is_empty() {
        comp.add_property("URL", event.url.as_str());
    }
    if !event.organizer.is_empty() {
        let organizer = format!("mailto:{}", event.organizer);
        comp.add_property("ORGANIZER", organizer.as_str());
    }
    comp.add_property(SOURCE_PROP, event.source.as_str());

    add_time_property(&mut comp, "DTSTART", event.start, event.all_day);
    add_time_property(&mut comp, "DTEND", event.end, event.all_day);

    comp.done()
}

/// All-day events emit `VALUE=DATE` local dates; timed events emit UTC.
fn add_time_property(comp: &mut IcalEvent, name: &str, t: DateTime<Utc>, all_day: bool) {
    if all_day {
        let date = t.with_timezone(&Local).date_naive();
        let mut prop = Property::new(name, date.format("%Y%m%d").to_string().as_str());
        prop.append_parameter(ValueType::Date);
        comp.append_property(prop);
    } else {
        let formatted = t.format("%Y%m%dT%H%M%SZ").to_string();
        comp.add_property(name, formatted.as_str());
    }
}
