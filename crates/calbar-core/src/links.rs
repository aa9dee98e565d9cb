//! Meeting-URL detection and classification.
//!
//! An ordered regex list recognizes known conferencing services before a
//! deliberately broad generic URL pattern. Detection prefers the event's
//! explicit URL field, then the location, then the description.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static ZOOM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[\w.-]*zoom\.us/j/[\w?=&-]+").expect("zoom regex"));

static TEAMS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://teams\.microsoft\.com/l/meetup-join/[^\s<>"]+"#).expect("teams regex")
});

static MEET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://meet\.google\.com/[\w-]+").expect("meet regex"));

static WEBEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[\w.-]*\.webex\.com/[\w./-]+").expect("webex regex"));

/// Broad catch-all, tried only after every service pattern.
static GENERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"]+"#).expect("generic url regex"));

/// A recognized video-conferencing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingService {
    Zoom,
    Teams,
    Meet,
    Webex,
}

impl MeetingService {
    /// Short display name, as used in join labels.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Zoom => "Zoom",
            Self::Teams => "Teams",
            Self::Meet => "Meet",
            Self::Webex => "Webex",
        }
    }

    fn pattern(&self) -> &'static Regex {
        match self {
            Self::Zoom => &ZOOM_RE,
            Self::Teams => &TEAMS_RE,
            Self::Meet => &MEET_RE,
            Self::Webex => &WEBEX_RE,
        }
    }

    const ALL: [MeetingService; 4] = [Self::Zoom, Self::Teams, Self::Meet, Self::Webex];
}

/// Classifies a URL as a known meeting service, if it is one.
pub fn classify(url: &str) -> Option<MeetingService> {
    MeetingService::ALL
        .into_iter()
        .find(|svc| svc.pattern().is_match(url))
}

/// A detected URL paired with a display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedLink {
    pub url: String,
    pub label: String,
}

/// Finds the meeting link for an event.
///
/// The explicit URL field wins when it matches a service pattern. Otherwise
/// service patterns are tried over location then description, and only then
/// the generic pattern in the same order.
pub fn detect_from_event(location: &str, description: &str, url: &str) -> Option<String> {
    if !url.is_empty() && classify(url).is_some() {
        return Some(url.to_string());
    }

    for text in [location, description] {
        if let Some(found) = find_service(text) {
            return Some(found);
        }
    }
    for text in [location, description] {
        if let Some(m) = GENERIC_RE.find(text) {
            return Some(m.as_str().to_string());
        }
    }
    None
}

fn find_service(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    MeetingService::ALL
        .into_iter()
        .find_map(|svc| svc.pattern().find(text))
        .map(|m| m.as_str().to_string())
}

/// Returns all URLs found in the event fields, de-duplicated and order
/// preserving. Meeting URLs come first with `"Join {Service} Meeting"`
/// labels; remaining URLs get a domain-derived label.
pub fn detect_all(location: &str, description: &str, url: &str) -> Vec<DetectedLink> {
    let mut seen: Vec<String> = Vec::new();
    let mut result = Vec::new();

    let mut add = |u: &str, label: String, result: &mut Vec<DetectedLink>| {
        if u.is_empty() || seen.iter().any(|s| s == u) {
            return;
        }
        seen.push(u.to_string());
        result.push(DetectedLink {
            url: u.to_string(),
            label,
        });
    };

    // Explicit URL field first, when it is a meeting link.
    if let Some(svc) = classify(url) {
        add(url, join_label(svc), &mut result);
    }

    // Service matches in location then description.
    for text in [location, description] {
        if text.is_empty() {
            continue;
        }
        for svc in MeetingService::ALL {
            for m in svc.pattern().find_iter(text) {
                add(m.as_str(), join_label(svc), &mut result);
            }
        }
    }

    // Any other URL, labeled by domain.
    for text in [location, description] {
        if text.is_empty() {
            continue;
        }
        for m in GENERIC_RE.find_iter(text) {
            add(m.as_str(), extract_domain(m.as_str()), &mut result);
        }
    }

    // Explicit URL as plain link if it was not a meeting link.
    if !url.is_empty() {
        add(url, extract_domain(url), &mut result);
    }

    result
}

fn join_label(svc: MeetingService) -> String {
    format!("Join {} Meeting", svc.display_name())
}

/// Reduces a URL to its host for display: protocol and `www.` stripped,
/// path and port removed.
pub fn extract_domain(url: &str) -> String {
    let mut domain = url;
    if let Some(idx) = domain.find("://") {
        domain = &domain[idx + 3..];
    }
    if let Some(idx) = domain.find('/') {
        domain = &domain[..idx];
    }
    if let Some(idx) = domain.find(':') {
        domain = &domain[..idx];
    }
    domain.strip_prefix("www.").unwrap_or(domain).to_string()
}
