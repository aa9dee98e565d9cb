//! The CalDAV `Source` implementation.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use url::Url;

use calbar_core::Event;

use crate::error::{FetchError, FetchResult};
use crate::normalize::parse_feed;
use crate::source::{BoxFuture, Source};

use super::client::DavClient;
use super::xml::{
    DiscoveredCalendar, calendar_query_body, parse_calendar_list, parse_nested_href,
    parse_report_response, propfind_calendars_body, propfind_home_set_body,
    propfind_principal_body,
};

/// iCloud speaks plain CalDAV at a fixed base URL.
const ICLOUD_BASE_URL: &str = "https://caldav.icloud.com";

/// How far back the calendar-query reaches, in days.
const QUERY_LOOKBEHIND_DAYS: i64 = 7;
/// How far ahead the calendar-query reaches, in days.
const QUERY_LOOKAHEAD_DAYS: i64 = 90;

/// A CalDAV calendar source. Sub-calendar events are tagged
/// `"{name}/{calendarName}"`.
pub struct CalDavSource {
    name: String,
    base: Url,
    client: DavClient,
    /// Case-insensitive display-name allowlist; empty syncs everything.
    calendars: Vec<String>,
}

impl CalDavSource {
    /// Creates a CalDAV source for an arbitrary server URL.
    pub fn new(
        name: impl Into<String>,
        url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        calendars: Vec<String>,
    ) -> FetchResult<Self> {
        let base = Url::parse(url).map_err(|e| FetchError::Config(format!("invalid URL: {e}")))?;
        Ok(Self {
            name: name.into(),
            base,
            client: DavClient::new(username, password)?,
            calendars,
        })
    }

    /// Creates an iCloud source (CalDAV with the fixed Apple base URL).
    pub fn icloud(
        name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        calendars: Vec<String>,
    ) -> FetchResult<Self> {
        Self::new(name, ICLOUD_BASE_URL, username, password, calendars)
    }

    /// Walks the discovery chain to the user's calendar collections.
    async fn discover(&self) -> FetchResult<Vec<DiscoveredCalendar>> {
        let base = self.base.as_str();

        let response = self
            .client
            .propfind(base, &propfind_principal_body(), 0)
            .await?;
        let principal = parse_nested_href(&response, "current-user-principal")
            .ok_or_else(|| FetchError::Discovery("no current-user-principal".into()))?;
        let principal_url = self.resolve(&principal);

        let response = self
            .client
            .propfind(&principal_url, &propfind_home_set_body(), 0)
            .await?;
        let home = parse_nested_href(&response, "calendar-home-set")
            .ok_or_else(|| FetchError::Discovery("no calendar-home-set".into()))?;
        let home_url = self.resolve(&home);

        let response = self
            .client
            .propfind(&home_url, &propfind_calendars_body(), 1)
            .await?;
        let calendars = parse_calendar_list(&response);

        debug!(source = %self.name, count = calendars.len(), "discovered calendars");
        Ok(calendars)
    }

    /// Whether a calendar passes the configured allowlist.
    fn wants_calendar(&self, display_name: &str) -> bool {
        self.calendars.is_empty()
            || self
                .calendars
                .iter()
                .any(|c| c.eq_ignore_ascii_case(display_name))
    }

    async fn fetch_calendar(
        &self,
        calendar: &DiscoveredCalendar,
        end: DateTime<Utc>,
    ) -> FetchResult<Vec<Event>> {
        let now = Utc::now();
        let query = calendar_query_body(
            now - Duration::days(QUERY_LOOKBEHIND_DAYS),
            now + Duration::days(QUERY_LOOKAHEAD_DAYS),
        );

        let url = self.resolve(&calendar.href);
        let response = self.client.report(&url, &query).await?;

        let calendar_name = calendar
            .display_name
            .clone()
            .unwrap_or_else(|| calendar.href.clone());
        let source = format!("{}/{}", self.name, calendar_name);

        let mut events = Vec::new();
        for (_href, ics) in parse_report_response(&response) {
            match parse_feed(&ics, &source, now, end) {
                Ok(mut parsed) => events.append(&mut parsed),
                Err(err) => {
                    debug!(source = %source, error = %err, "skipping undecodable object");
                }
            }
        }

        debug!(source = %source, count = events.len(), "fetched calendar");
        Ok(events)
    }

    async fn fetch_all(&self, end: DateTime<Utc>) -> FetchResult<Vec<Event>> {
        let calendars = self.discover().await?;

        let selected: Vec<&DiscoveredCalendar> = calendars
            .iter()
            .filter(|c| self.wants_calendar(c.display_name.as_deref().unwrap_or_default()))
            .collect();

        if selected.is_empty() {
            return Err(FetchError::Discovery("no calendars matched".into()));
        }

        let mut all_events = Vec::new();
        for calendar in selected {
            match self.fetch_calendar(calendar, end).await {
                Ok(mut events) => all_events.append(&mut events),
                Err(err) => {
                    // One bad calendar does not fail the adapter.
                    warn!(source = %self.name, href = %calendar.href, error = %err,
                          "failed to fetch calendar");
                }
            }
        }

        Ok(all_events)
    }

    fn resolve(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            return href.to_string();
        }
        self.base
            .join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string())
    }
}

impl Source for CalDavSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, end: DateTime<Utc>) -> BoxFuture<'_, FetchResult<Vec<Event>>> {
        Box::pin(self.fetch_all(end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(calendars: Vec<String>) -> CalDavSource {
        CalDavSource::new(
            "dav",
            "https://dav.example.com/base/",
            "user",
            "pass",
            calendars,
        )
        .unwrap()
    }

    #[test]
    fn icloud_uses_fixed_base() {
        let source = CalDavSource::icloud("icloud", "user", "pass", vec![]).unwrap();
        assert_eq!(source.base.as_str(), "https://caldav.icloud.com/");
        assert_eq!(source.name(), "icloud");
    }

    #[test]
    fn calendar_allowlist_is_case_insensitive() {
        let source = source(vec!["Work".to_string()]);
        assert!(source.wants_calendar("work"));
        assert!(source.wants_calendar("WORK"));
        assert!(!source.wants_calendar("personal"));
    }

    #[test]
    fn empty_allowlist_wants_everything() {
        let source = source(vec![]);
        assert!(source.wants_calendar("anything"));
    }

    #[test]
    fn href_resolution() {
        let source = source(vec![]);
        assert_eq!(
            source.resolve("/calendars/u/work/"),
            "https://dav.example.com/calendars/u/work/"
        );
        assert_eq!(
            source.resolve("work/"),
            "https://dav.example.com/base/work/"
        );
        assert_eq!(
            source.resolve("https://other.example.com/cal/"),
            "https://other.example.com/cal/"
        );
    }

    #[test]
    fn invalid_url_is_config_error() {
        let result = CalDavSource::new("bad", "not a url", "", "", vec![]);
        assert!(matches!(result, Err(FetchError::Config(_))));
    }
}
