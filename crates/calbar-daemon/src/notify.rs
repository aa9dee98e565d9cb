//! The notification scheduler and the desktop notifier capability.
//!
//! The scheduler runs on its own 30-second tick, independent of the sync
//! interval. A `(uid, threshold)` ticket guarantees at most one
//! notification per threshold per event; a failed send records no ticket,
//! so a later tick inside the window retries.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use calbar_core::{Event, detect_from_event, format_starts_in};
use calbar_sources::BoxFuture;

/// Tick period of the notification scheduler.
pub const NOTIFY_TICK: std::time::Duration = std::time::Duration::from_secs(30);

/// How long sent-notification tickets are retained.
const TICKET_RETENTION_HOURS: i64 = 24;

/// Notification urgency, escalated as the event start approaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Low,
    Normal,
    Critical,
}

/// An action button attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub key: String,
    pub label: String,
}

/// A desktop notification to be sent.
#[derive(Debug, Clone)]
pub struct Notification {
    pub summary: String,
    pub body: String,
    pub urgency: Urgency,
    pub actions: Vec<Action>,
    pub event_uid: String,
}

/// Error from a notification send. Not retried by the sender; the
/// scheduler simply leaves no ticket behind.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("send notification: {0}")]
    Send(String),
}

/// The capability the scheduler sends through. `send` returns the
/// notification id used to correlate action invocations back to a URL.
pub trait Notifier: Send + Sync {
    fn send(&self, notification: Notification) -> BoxFuture<'_, Result<u32, NotifyError>>;
}

/// Notifier backed by the desktop notification service.
pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

impl Notifier for DesktopNotifier {
    fn send(&self, notification: Notification) -> BoxFuture<'_, Result<u32, NotifyError>> {
        let app_name = self.app_name.clone();
        Box::pin(async move {
            // notify-rust blocks on the bus; keep it off the async workers.
            tokio::task::spawn_blocking(move || send_desktop(&app_name, notification))
                .await
                .map_err(|e| NotifyError::Send(e.to_string()))?
        })
    }
}

fn send_desktop(app_name: &str, notification: Notification) -> Result<u32, NotifyError> {
    let mut desktop = notify_rust::Notification::new();
    desktop
        .appname(app_name)
        .summary(&notification.summary)
        .body(&notification.body)
        .icon("x-office-calendar");

    #[cfg(target_os = "linux")]
    {
        let urgency = match notification.urgency {
            Urgency::Low => notify_rust::Urgency::Low,
            Urgency::Normal => notify_rust::Urgency::Normal,
            Urgency::Critical => notify_rust::Urgency::Critical,
        };
        desktop.urgency(urgency);
        for action in &notification.actions {
            desktop.action(&action.key, &action.label);
        }
    }

    let handle = desktop
        .show()
        .map_err(|e| NotifyError::Send(e.to_string()))?;

    #[cfg(target_os = "linux")]
    {
        Ok(handle.id())
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = handle;
        Ok(0)
    }
}

/// Decides which notifications are due and remembers what was sent.
#[derive(Debug)]
pub struct NotificationScheduler {
    enabled: bool,
    /// Lead times, e.g. 15 m and 5 m before start.
    thresholds: Vec<Duration>,
    event_end_grace: Duration,
    /// `(uid, threshold seconds)` → send time.
    tickets: HashMap<(String, i64), DateTime<Utc>>,
    /// Notification id → (join url, send time).
    action_urls: HashMap<u32, (String, DateTime<Utc>)>,
}

impl NotificationScheduler {
    pub fn new(enabled: bool, thresholds: Vec<Duration>, event_end_grace: Duration) -> Self {
        Self {
            enabled,
            thresholds,
            event_end_grace,
            tickets: HashMap::new(),
            action_urls: HashMap::new(),
        }
    }

    /// One scheduler tick over the currently visible events.
    ///
    /// For each upcoming event and threshold `T`, a notification fires when
    /// `start − now` lands in the half-open window `(T − 1 minute, T]` and
    /// no ticket for `(uid, T)` exists yet. Returns the number sent.
    pub async fn check(
        &mut self,
        notifier: &dyn Notifier,
        events: &[Event],
        now: DateTime<Utc>,
    ) -> usize {
        if !self.enabled {
            return 0;
        }

        let mut sent = 0;
        for event in events {
            if event.start <= now {
                continue;
            }
            if event.end + self.event_end_grace <= now {
                continue;
            }

            let starts_in = event.start - now;
            for &threshold in &self.thresholds {
                let in_window =
                    starts_in <= threshold && starts_in > threshold - Duration::minutes(1);
                if !in_window {
                    continue;
                }

                let key = (event.uid.clone(), threshold.num_seconds());
                if self.tickets.contains_key(&key) {
                    continue;
                }

                let join_url =
                    detect_from_event(&event.location, &event.description, &event.url)
                        .filter(|url| calbar_core::classify(url).is_some());

                let urgency = if starts_in <= Duration::minutes(5) {
                    Urgency::Critical
                } else {
                    Urgency::Normal
                };

                let mut notification = Notification {
                    summary: event.summary.clone(),
                    body: format!("Starts in {}", format_starts_in(starts_in)),
                    urgency,
                    actions: Vec::new(),
                    event_uid: event.uid.clone(),
                };
                if join_url.is_some() {
                    notification.actions.push(Action {
                        key: "join".to_string(),
                        label: "Join Meeting".to_string(),
                    });
                }

                match notifier.send(notification).await {
                    Ok(id) => {
                        debug!(uid = %event.uid, id = id, "notification sent");
                        self.tickets.insert(key, now);
                        if let Some(url) = join_url {
                            self.action_urls.insert(id, (url, now));
                        }
                        sent += 1;
                    }
                    Err(err) => {
                        // No ticket recorded; a later tick inside the
                        // window retries.
                        warn!(uid = %event.uid, error = %err, "failed to send notification");
                    }
                }
            }
        }

        self.prune(now);
        sent
    }

    /// Resolves a notification action invocation back to its join URL.
    pub fn url_for_action(&self, id: u32) -> Option<&str> {
        self.action_urls.get(&id).map(|(url, _)| url.as_str())
    }

    /// Drops tickets and action correlations older than the retention
    /// period.
    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::hours(TICKET_RETENTION_HOURS);
        self.tickets.retain(|_, sent_at| *sent_at >= cutoff);
        self.action_urls.retain(|_, (_, sent_at)| *sent_at >= cutoff);
    }

    #[cfg(test)]
    fn ticket_count(&self) -> usize {
        self.tickets.len()
    }
}
