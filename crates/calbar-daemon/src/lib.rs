//! The calbar daemon: configuration, the sync loop, staleness tracking, the
//! hidden-event registry, the notification scheduler, and the application
//! loop that ties them together and publishes views to UI surfaces.

pub mod app;
pub mod config;
pub mod error;
pub mod hidden;
pub mod notify;
pub mod signals;
pub mod staleness;
pub mod syncer;

pub use app::{App, UiIntent};
pub use config::{Config, ConfigError, ResolvedSource, SourceConfig};
pub use error::DaemonError;
pub use hidden::{HiddenEntry, HiddenRegistry};
pub use notify::{
    Action, DesktopNotifier, Notification, NotificationScheduler, Notifier, NotifyError, Urgency,
};
pub use signals::ShutdownHandle;
pub use staleness::StalenessTracker;
pub use syncer::{SourceResult, SyncOutcome, Syncer};
