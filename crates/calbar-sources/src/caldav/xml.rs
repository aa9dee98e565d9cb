//! WebDAV XML: request bodies and multistatus response parsing.

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event as XmlEvent;

/// A calendar collection found during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCalendar {
    /// The collection href (path or absolute URL).
    pub href: String,
    /// The display name, when the server reports one.
    pub display_name: Option<String>,
}

/// PROPFIND body asking for the current user's principal.
pub fn propfind_principal_body() -> String {
    r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop><d:current-user-principal/></d:prop>
</d:propfind>"#
        .to_string()
}

/// PROPFIND body asking for the principal's calendar home set.
pub fn propfind_home_set_body() -> String {
    r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop><c:calendar-home-set/></d:prop>
</d:propfind>"#
        .to_string()
}

/// PROPFIND body enumerating collections with name and resource type.
pub fn propfind_calendars_body() -> String {
    r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop><d:displayname/><d:resourcetype/></d:prop>
</d:propfind>"#
        .to_string()
}

/// REPORT body for a `calendar-query` restricted to VEVENTs in a time range.
pub fn calendar_query_body(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<c:calendar-query xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop><d:getetag/><c:calendar-data/></d:prop>
  <c:filter>
    <c:comp-filter name="VCALENDAR">
      <c:comp-filter name="VEVENT">
        <c:time-range start="{}" end="{}"/>
      </c:comp-filter>
    </c:comp-filter>
  </c:filter>
</c:calendar-query>"#,
        format_caldav_time(start),
        format_caldav_time(end)
    )
}

fn format_caldav_time(t: DateTime<Utc>) -> String {
    t.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Extracts the `<href>` nested inside the named property element, e.g.
/// `current-user-principal` or `calendar-home-set`.
pub fn parse_nested_href(xml: &str, property: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_property = false;
    let mut in_href = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let local = local_name(&name);
                if local == property {
                    in_property = true;
                } else if local == "href" && in_property {
                    in_href = true;
                }
            }
            Ok(XmlEvent::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let local = local_name(&name);
                if local == property {
                    in_property = false;
                } else if local == "href" {
                    in_href = false;
                }
            }
            Ok(XmlEvent::Text(e)) if in_href => {
                let text = e.unescape().unwrap_or_default().trim().to_string();
                if !text.is_empty() {
                    return Some(text);
                }
            }
            Ok(XmlEvent::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

/// Parses a calendar-enumeration PROPFIND response. Only collections whose
/// resourcetype includes `<calendar/>` are returned.
pub fn parse_calendar_list(xml: &str) -> Vec<DiscoveredCalendar> {
    let mut calendars = Vec::new();

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut href: Option<String> = None;
    let mut display_name: Option<String> = None;
    let mut is_calendar = false;
    let mut current: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(e)) | Ok(XmlEvent::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match local_name(&name) {
                    "response" => {
                        href = None;
                        display_name = None;
                        is_calendar = false;
                    }
                    "calendar" => is_calendar = true,
                    local @ ("href" | "displayname") => current = Some(local.to_string()),
                    _ => {}
                }
            }
            Ok(XmlEvent::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if local_name(&name) == "response" {
                    if is_calendar {
                        if let Some(href) = href.take() {
                            calendars.push(DiscoveredCalendar {
                                href,
                                display_name: display_name.take(),
                            });
                        }
                    }
                } else {
                    current = None;
                }
            }
            Ok(XmlEvent::Text(e)) => {
                if let Some(ref elem) = current {
                    let text = e.unescape().unwrap_or_default().to_string();
                    match elem.as_str() {
                        "href" => href = Some(text),
                        "displayname" => display_name = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(XmlEvent::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    calendars
}

/// Parses a REPORT multistatus response into `(href, ics_data)` pairs.
pub fn parse_report_response(xml: &str) -> Vec<(String, String)> {
    let mut results = Vec::new();

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut href: Option<String> = None;
    let mut data: Option<String> = None;
    let mut current: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match local_name(&name) {
                    "response" => {
                        href = None;
                        data = None;
                    }
                    local @ ("href" | "calendar-data") => current = Some(local.to_string()),
                    _ => {}
                }
            }
            Ok(XmlEvent::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if local_name(&name) == "response" {
                    if let (Some(href), Some(data)) = (href.take(), data.take()) {
                        results.push((href, data));
                    }
                } else {
                    current = None;
                }
            }
            Ok(XmlEvent::Text(e)) => {
                if let Some(ref elem) = current {
                    let text = e.unescape().unwrap_or_default().to_string();
                    match elem.as_str() {
                        "href" => href = Some(text),
                        "calendar-data" => data = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(XmlEvent::CData(e)) => {
                if let Some(ref elem) = current {
                    let text = String::from_utf8_lossy(&e).to_string();
                    match elem.as_str() {
                        "href" => href = Some(text),
                        "calendar-data" => data = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(XmlEvent::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    results
}

/// Strips any namespace prefix from an element name.
fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn query_body_contains_range() {
        let start = Utc.with_ymd_and_hms(2026, 2, 10, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 5, 18, 0, 0, 0).unwrap();
        let body = calendar_query_body(start, end);

        assert!(body.contains("calendar-query"));
        assert!(body.contains("VEVENT"));
        assert!(body.contains("20260210T000000Z"));
        assert!(body.contains("20260518T000000Z"));
    }

    #[test]
    fn parse_principal_href() {
        let xml = r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/</d:href>
    <d:propstat>
      <d:prop>
        <d:current-user-principal>
          <d:href>/principals/users/alice/</d:href>
        </d:current-user-principal>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

        assert_eq!(
            parse_nested_href(xml, "current-user-principal").as_deref(),
            Some("/principals/users/alice/")
        );
        assert_eq!(parse_nested_href(xml, "calendar-home-set"), None);
    }

    #[test]
    fn parse_calendar_collections_only() {
        let xml = r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:response>
    <d:href>/calendars/alice/</d:href>
    <d:propstat>
      <d:prop>
        <d:displayname>Home</d:displayname>
        <d:resourcetype><d:collection/></d:resourcetype>
      </d:prop>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/calendars/alice/work/</d:href>
    <d:propstat>
      <d:prop>
        <d:displayname>Work</d:displayname>
        <d:resourcetype><d:collection/><c:calendar/></d:resourcetype>
      </d:prop>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

        let calendars = parse_calendar_list(xml);
        assert_eq!(calendars.len(), 1);
        assert_eq!(calendars[0].href, "/calendars/alice/work/");
        assert_eq!(calendars[0].display_name.as_deref(), Some("Work"));
    }

    #[test]
    fn parse_report_events() {
        let xml = r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:response>
    <d:href>/calendars/alice/work/1.ics</d:href>
    <d:propstat>
      <d:prop>
        <d:getetag>"abc"</d:getetag>
        <c:calendar-data>BEGIN:VCALENDAR
BEGIN:VEVENT
UID:1
END:VEVENT
END:VCALENDAR</c:calendar-data>
      </d:prop>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

        let results = parse_report_response(xml);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "/calendars/alice/work/1.ics");
        assert!(results[0].1.contains("UID:1"));
    }

    #[test]
    fn local_name_strips_prefix() {
        assert_eq!(local_name("d:response"), "response");
        assert_eq!(local_name("response"), "response");
    }
}
