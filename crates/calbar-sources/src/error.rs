//! Fetch errors shared by all source adapters.
//!
//! Adapters never retry internally; a [`FetchError`] propagates to the
//! syncer, which marks the source failed for the round. Per-event decode
//! problems are swallowed inside the adapters and never surface here.

use thiserror::Error;

/// An error from fetching a calendar source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with an unexpected HTTP status.
    #[error("http status {0}")]
    Http(u16),

    /// Connection, TLS, DNS, or timeout failure.
    #[error("network: {0}")]
    Network(#[from] reqwest::Error),

    /// Credentials were rejected or token acquisition failed.
    #[error("authentication: {0}")]
    Auth(String),

    /// The response body could not be decoded at all (a malformed feed, not
    /// a single bad event).
    #[error("decode: {0}")]
    Decode(String),

    /// CalDAV discovery could not locate a usable calendar collection.
    #[error("discovery: {0}")]
    Discovery(String),

    /// The adapter was misconfigured (bad URL, missing fields).
    #[error("configuration: {0}")]
    Config(String),
}

impl FetchError {
    /// True for errors caused by credentials rather than transport.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_)) || matches!(self, Self::Http(401) | Self::Http(403))
    }
}

/// Specialized result for adapter operations.
pub type FetchResult<T> = Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        assert_eq!(FetchError::Http(503).to_string(), "http status 503");
        assert_eq!(
            FetchError::Auth("bad password".into()).to_string(),
            "authentication: bad password"
        );
    }

    #[test]
    fn auth_classification() {
        assert!(FetchError::Http(401).is_auth());
        assert!(FetchError::Http(403).is_auth());
        assert!(FetchError::Auth("x".into()).is_auth());
        assert!(!FetchError::Http(503).is_auth());
        assert!(!FetchError::Decode("x".into()).is_auth());
    }
}
