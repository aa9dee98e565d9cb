//! The `Source` capability all adapters implement.

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use calbar_core::Event;

use crate::error::FetchResult;

/// A boxed future, used so the trait stays object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A remote calendar endpoint plus the adapter that speaks its protocol.
///
/// `fetch` retrieves events from now until `end`. Implementations keep every
/// wait at an `.await` point so that dropping the returned future cancels
/// the fetch promptly; they never retry internally (the next sync tick is
/// the retry).
pub trait Source: Send + Sync {
    /// The configured display name of this source.
    fn name(&self) -> &str;

    /// Fetches events overlapping `[now, end]`.
    fn fetch(&self, end: DateTime<Utc>) -> BoxFuture<'_, FetchResult<Vec<Event>>>;
}

/// The four supported source kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Ics,
    Caldav,
    Icloud,
    Ms365,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ics => "ics",
            Self::Caldav => "caldav",
            Self::Icloud => "icloud",
            Self::Ms365 => "ms365",
        }
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ics" => Ok(Self::Ics),
            "caldav" => Ok(Self::Caldav),
            "icloud" => Ok(Self::Icloud),
            "ms365" => Ok(Self::Ms365),
            other => Err(format!("unknown source type {other:?}")),
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrip() {
        for kind in [
            SourceKind::Ics,
            SourceKind::Caldav,
            SourceKind::Icloud,
            SourceKind::Ms365,
        ] {
            assert_eq!(kind.as_str().parse::<SourceKind>().unwrap(), kind);
        }
        assert!("gopher".parse::<SourceKind>().is_err());
    }
}
