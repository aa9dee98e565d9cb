//! Source adapters: ICS-over-HTTP, CalDAV, iCloud, and MS365 (Graph).
//!
//! Every adapter normalizes its wire format into [`calbar_core::Event`]
//! values through the shared iCalendar normalizer, and implements the
//! narrow [`Source`] capability the syncer fans out over.

pub mod caldav;
pub mod error;
pub mod ics;
pub mod ms365;
pub mod normalize;
pub mod source;
pub mod store;

pub use caldav::CalDavSource;
pub use error::{FetchError, FetchResult};
pub use ics::IcsSource;
pub use ms365::{Ms365Source, StaticTokenProvider, TokenProvider};
pub use source::{BoxFuture, Source, SourceKind};
pub use store::{parse_ics, read_ics, write_ics};
