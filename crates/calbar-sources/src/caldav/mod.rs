//! CalDAV source adapter (also used for iCloud, which is CalDAV with a
//! fixed base URL).
//!
//! Fetching walks the standard discovery chain — `current-user-principal`,
//! `calendar-home-set`, calendar enumeration — then issues a
//! `calendar-query` REPORT per selected calendar. A failing calendar is
//! skipped without failing the whole adapter.

mod client;
mod provider;
mod xml;

pub use client::DavClient;
pub use provider::CalDavSource;
pub use xml::DiscoveredCalendar;
