//! Include/exclude filtering of events.
//!
//! Filter rules come from configuration. Each rule names a field and exactly
//! one matcher; rules compile into an [`EventFilter`] holding separate
//! include and exclude sets. Evaluation: any matching exclude rule rejects
//! the event; with no include rules everything else passes; otherwise the
//! include rules combine per the configured mode.

use std::borrow::Cow;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::Event;

/// How multiple include rules combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// At least one include rule must match.
    #[default]
    Or,
    /// Every include rule must match.
    And,
}

/// A filter rule list with a combination mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub mode: FilterMode,
    #[serde(default)]
    pub rules: Vec<FilterRule>,
}

/// A single configured rule. Exactly one of `contains`, `exact`, `prefix`,
/// `suffix`, `regex` must be set; the legacy `match` field is honored only
/// when no typed matcher is present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterRule {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub exclude: bool,
    /// Legacy single-field matcher: `regex:<pattern>` or a contains pattern.
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub legacy_match: Option<String>,
}

/// Error produced when compiling a [`FilterConfig`].
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("rule {index}: no match pattern specified (use contains, exact, prefix, suffix, or regex)")]
    NoMatcher { index: usize },
    #[error("rule {index}: invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        index: usize,
        pattern: String,
        source: regex::Error,
    },
}

/// The event field a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Summary,
    Organizer,
    Source,
    Description,
    Location,
    Unknown,
}

impl Field {
    fn parse(name: &str) -> Self {
        match name {
            "title" | "summary" => Self::Summary,
            "organizer" => Self::Organizer,
            "source" | "calendar" => Self::Source,
            "description" => Self::Description,
            "location" => Self::Location,
            _ => Self::Unknown,
        }
    }

    fn extract<'a>(&self, event: &'a Event) -> &'a str {
        match self {
            Self::Summary => &event.summary,
            Self::Organizer => &event.organizer,
            Self::Source => &event.source,
            Self::Description => &event.description,
            Self::Location => &event.location,
            Self::Unknown => "",
        }
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Contains(String),
    Exact(String),
    Prefix(String),
    Suffix(String),
    Regex(Regex),
}

#[derive(Debug, Clone)]
struct CompiledRule {
    field: Field,
    matcher: Matcher,
    case_insensitive: bool,
}

impl CompiledRule {
    fn matches(&self, event: &Event) -> bool {
        let raw = self.field.extract(event);
        // Regexes carry their own (?i); other matchers lowercase both sides.
        let value: Cow<'_, str> =
            if self.case_insensitive && !matches!(self.matcher, Matcher::Regex(_)) {
                Cow::Owned(raw.to_lowercase())
            } else {
                Cow::Borrowed(raw)
            };

        match &self.matcher {
            Matcher::Contains(p) => value.contains(p.as_str()),
            Matcher::Exact(p) => value.as_ref() == p,
            Matcher::Prefix(p) => value.starts_with(p.as_str()),
            Matcher::Suffix(p) => value.ends_with(p.as_str()),
            Matcher::Regex(re) => re.is_match(&value),
        }
    }
}

/// A compiled filter ready for evaluation.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    mode: FilterMode,
    includes: Vec<CompiledRule>,
    excludes: Vec<CompiledRule>,
}

impl EventFilter {
    /// Compiles a filter configuration.
    pub fn compile(config: &FilterConfig) -> Result<Self, FilterError> {
        let mut includes = Vec::new();
        let mut excludes = Vec::new();

        for (index, rule) in config.rules.iter().enumerate() {
            let compiled = compile_rule(rule, index)?;
            if rule.exclude {
                excludes.push(compiled);
            } else {
                includes.push(compiled);
            }
        }

        Ok(Self {
            mode: config.mode,
            includes,
            excludes,
        })
    }

    /// True when the filter has no rules at all.
    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty()
    }

    /// Whether a single event passes the filter.
    pub fn accepts(&self, event: &Event) -> bool {
        // Exclusion wins over any include.
        if self.excludes.iter().any(|r| r.matches(event)) {
            return false;
        }

        if self.includes.is_empty() {
            return true;
        }

        match self.mode {
            FilterMode::Or => self.includes.iter().any(|r| r.matches(event)),
            FilterMode::And => self.includes.iter().all(|r| r.matches(event)),
        }
    }

    /// Filters a batch of events, keeping accepted ones in order.
    pub fn apply(&self, events: Vec<Event>) -> Vec<Event> {
        if self.is_empty() {
            return events;
        }
        events.into_iter().filter(|e| self.accepts(e)).collect()
    }
}

fn compile_rule(rule: &FilterRule, index: usize) -> Result<CompiledRule, FilterError> {
    let field = Field::parse(&rule.field);
    let ci = rule.case_insensitive;

    let lower = |p: &str| {
        if ci {
            p.to_lowercase()
        } else {
            p.to_string()
        }
    };
    let compile_regex = |pattern: &str| {
        let full = if ci {
            format!("(?i){}", pattern)
        } else {
            pattern.to_string()
        };
        Regex::new(&full).map_err(|source| FilterError::InvalidRegex {
            index,
            pattern: pattern.to_string(),
            source,
        })
    };

    // An explicitly-present empty pattern is a valid matcher (it matches
    // anything); only absent fields fall through.
    let matcher = if let Some(p) = rule.regex.as_deref() {
        Matcher::Regex(compile_regex(p)?)
    } else if let Some(p) = rule.exact.as_deref() {
        Matcher::Exact(lower(p))
    } else if let Some(p) = rule.prefix.as_deref() {
        Matcher::Prefix(lower(p))
    } else if let Some(p) = rule.suffix.as_deref() {
        Matcher::Suffix(lower(p))
    } else if let Some(p) = rule.contains.as_deref() {
        Matcher::Contains(lower(p))
    } else if let Some(m) = rule.legacy_match.as_deref().filter(|p| !p.is_empty()) {
        if let Some(pattern) = m.strip_prefix("regex:") {
            Matcher::Regex(compile_regex(pattern)?)
        } else {
            Matcher::Contains(lower(m))
        }
    } else {
        return Err(FilterError::NoMatcher { index });
    };

    Ok(CompiledRule {
        field,
        matcher,
        case_insensitive: ci,
    })
}
