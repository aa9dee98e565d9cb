//! Microsoft 365 source adapter, speaking the Graph `calendarView` API.
//!
//! Recurrence expansion is server-side: `calendarView` returns occurrence
//! instances for the requested range, so events pass through without
//! client-side RRULE handling.
//!
//! Token acquisition is an external capability. The adapter consumes a
//! [`TokenProvider`] and initializes it lazily, once per process; broker
//! and device-code flows live behind that seam.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use calbar_core::Event;

use crate::error::{FetchError, FetchResult};
use crate::source::{BoxFuture, Source};

const GRAPH_CALENDAR_VIEW: &str = "https://graph.microsoft.com/v1.0/me/calendarView";
const FETCH_TIMEOUT: StdDuration = StdDuration::from_secs(30);
const PAGE_SIZE: u32 = 500;

/// Acquires Graph access tokens. Implementations wrap whatever auth flow
/// the environment provides (identity broker, device code, a token command).
pub trait TokenProvider: Send + Sync {
    /// Returns a currently valid bearer token.
    fn access_token(&self) -> BoxFuture<'_, FetchResult<String>>;
}

/// A token provider around a pre-resolved bearer token string.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn access_token(&self) -> BoxFuture<'_, FetchResult<String>> {
        let token = self.token.clone();
        Box::pin(async move {
            if token.is_empty() {
                Err(FetchError::Auth("no access token configured".into()))
            } else {
                Ok(token)
            }
        })
    }
}

/// Factory that produces the token provider on first use.
pub type TokenProviderFactory =
    Box<dyn Fn() -> BoxFuture<'static, FetchResult<Arc<dyn TokenProvider>>> + Send + Sync>;

/// Microsoft 365 calendar source.
pub struct Ms365Source {
    name: String,
    client: Client,
    factory: TokenProviderFactory,
    auth: OnceCell<Arc<dyn TokenProvider>>,
}

impl Ms365Source {
    /// Creates an MS365 source whose auth provider is built lazily by
    /// `factory` on the first fetch.
    pub fn new(name: impl Into<String>, factory: TokenProviderFactory) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(FetchError::Network)?;
        Ok(Self {
            name: name.into(),
            client,
            factory,
            auth: OnceCell::new(),
        })
    }

    /// Convenience constructor for a pre-resolved bearer token.
    pub fn with_token(name: impl Into<String>, token: impl Into<String>) -> FetchResult<Self> {
        let provider: Arc<dyn TokenProvider> = Arc::new(StaticTokenProvider::new(token));
        Self::new(
            name,
            Box::new(move || {
                let provider = provider.clone();
                Box::pin(async move { Ok(provider) })
            }),
        )
    }

    async fn provider(&self) -> FetchResult<&Arc<dyn TokenProvider>> {
        self.auth.get_or_try_init(|| (self.factory)()).await
    }

    async fn fetch_events(&self, end: DateTime<Utc>) -> FetchResult<Vec<Event>> {
        let token = self.provider().await?.access_token().await?;
        let now = Utc::now();

        let mut url = format!(
            "{}?startDateTime={}&endDateTime={}&$orderby=start/dateTime&$top={}&$select={}",
            GRAPH_CALENDAR_VIEW,
            now.to_rfc3339(),
            end.to_rfc3339(),
            PAGE_SIZE,
            "id,subject,bodyPreview,body,start,end,location,isAllDay,isCancelled,organizer,\
             webLink,onlineMeeting,onlineMeetingUrl",
        );

        let mut events = Vec::new();
        loop {
            let page = self.fetch_page(&token, &url).await?;
            for raw in page.value {
                if raw.is_cancelled {
                    continue;
                }
                match convert_event(raw, &self.name) {
                    Ok(event) => events.push(event),
                    Err(err) => {
                        warn!(source = %self.name, error = %err, "skipping event conversion");
                    }
                }
            }
            match page.next_link {
                Some(next) => url = next,
                None => break,
            }
        }

        debug!(source = %self.name, count = events.len(), "fetched MS365 events");
        Ok(events)
    }

    async fn fetch_page(&self, token: &str, url: &str) -> FetchResult<GraphCalendarResponse> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/json")
            .header(
                "Prefer",
                r#"outlook.timezone="UTC", outlook.body-content-type="text""#,
            )
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(FetchError::Auth("Graph API rejected token".into()));
        }
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Http(status.as_u16()));
        }

        response
            .json::<GraphCalendarResponse>()
            .await
            .map_err(FetchError::Network)
    }
}

impl Source for Ms365Source {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, end: DateTime<Utc>) -> BoxFuture<'_, FetchResult<Vec<Event>>> {
        Box::pin(self.fetch_events(end))
    }
}

#[derive(Debug, Deserialize)]
struct GraphCalendarResponse {
    #[serde(default)]
    value: Vec<GraphEvent>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GraphEvent {
    id: String,
    subject: String,
    body_preview: String,
    body: Option<GraphBody>,
    start: GraphDateTime,
    end: GraphDateTime,
    location: Option<GraphLocation>,
    is_all_day: bool,
    is_cancelled: bool,
    organizer: Option<GraphOrganizer>,
    web_link: String,
    online_meeting: Option<GraphOnlineMeeting>,
    online_meeting_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GraphBody {
    content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GraphDateTime {
    date_time: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GraphLocation {
    display_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GraphOrganizer {
    email_address: GraphEmailAddress,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GraphEmailAddress {
    address: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GraphOnlineMeeting {
    join_url: String,
}

fn convert_event(raw: GraphEvent, source: &str) -> Result<Event, String> {
    let start = parse_graph_datetime(&raw.start.date_time)
        .ok_or_else(|| format!("unparseable start {:?}", raw.start.date_time))?;
    let end = parse_graph_datetime(&raw.end.date_time)
        .ok_or_else(|| format!("unparseable end {:?}", raw.end.date_time))?;

    let mut event = Event::new(raw.id, raw.subject, start, end)
        .with_source(source)
        .with_all_day(raw.is_all_day)
        .with_url(raw.web_link);

    if let Some(location) = raw.location {
        event.location = location.display_name;
    }
    event.description = match raw.body {
        Some(body) if !body.content.is_empty() => body.content,
        _ => raw.body_preview,
    };
    if let Some(organizer) = raw.organizer {
        event.organizer = organizer.email_address.address;
    }

    // Surface the join URL where the link classifier will find it.
    let join_url = raw
        .online_meeting
        .map(|m| m.join_url)
        .filter(|u| !u.is_empty())
        .or(raw.online_meeting_url)
        .filter(|u| !u.is_empty());
    if let Some(join_url) = join_url {
        if event.location.is_empty() {
            event.location = join_url;
        } else {
            event.description = format!("{}\n{}", join_url, event.description);
        }
    }

    Ok(event)
}

/// Parses a Graph datetime, which arrives in UTC because of the `Prefer`
/// header. Format: `2026-02-17T09:00:00.0000000`.
fn parse_graph_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}
