//! Top-level daemon errors.

use thiserror::Error;

use calbar_core::FilterError;
use calbar_sources::FetchError;

use crate::config::ConfigError;

/// Fatal errors surfaced at startup. Sync-time errors are recoverable and
/// flow through the staleness tracker instead.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("no calendar sources configured")]
    NoSources,

    #[error("source {name}: {source}")]
    Source {
        name: String,
        #[source]
        source: FetchError,
    },

    #[error("source {name}: {source}")]
    Filter {
        name: String,
        #[source]
        source: FilterError,
    },
}
