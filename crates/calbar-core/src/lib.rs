//! Core types: events, time rules, filters, link detection, view building

pub mod event;
pub mod filter;
pub mod links;
pub mod time;
pub mod tracing;
pub mod view;

pub use event::{Event, merge};
pub use filter::{EventFilter, FilterConfig, FilterError, FilterMode, FilterRule};
pub use links::{DetectedLink, MeetingService, classify, detect_all, detect_from_event};
pub use time::{
    DurationError, format_duration, format_starts_in, is_effectively_all_day, parse_duration,
};
pub use tracing::{TracingConfig, TracingError, TracingFormat, init_tracing};
pub use view::{DayGroup, Status, TimedEvent, View, build_view, derive_status, format_all_day_range};
