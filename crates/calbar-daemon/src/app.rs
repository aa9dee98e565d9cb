//! The application loop.
//!
//! Owns all mutable state, drives the syncer and the notification tick,
//! bridges UI intents back into the registries, and publishes views over a
//! `watch` channel. UI surfaces talk to the core exclusively through the
//! intent sender and the view receiver.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::{RwLock, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use calbar_core::{Event, Status, View, build_view, derive_status};
use calbar_sources::store;

use crate::config::Config;
use crate::error::DaemonError;
use crate::hidden::HiddenRegistry;
use crate::notify::{DesktopNotifier, NOTIFY_TICK, NotificationScheduler, Notifier};
use crate::staleness::StalenessTracker;
use crate::syncer::{SyncOutcome, Syncer};

/// A user action arriving from a UI surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiIntent {
    /// Suppress an event from the default view.
    Hide(String),
    /// Restore a hidden event.
    Unhide(String),
    /// Open a URL (join button, link list).
    OpenUrl(String),
    /// The user toggled the surface; acknowledged by republishing.
    Toggle,
}

/// State guarded by the application lock. Snapshots for publication are
/// taken under the read half; the lock is never held across I/O.
struct AppState {
    tracker: StalenessTracker,
    hidden: HiddenRegistry,
    first_sync_done: bool,
}

/// The long-running application core.
pub struct App {
    config: Config,
    syncer: Arc<Syncer>,
    state: Arc<RwLock<AppState>>,
    scheduler: NotificationScheduler,
    notifier: Arc<dyn Notifier>,
    view_tx: watch::Sender<View>,
    view_rx: watch::Receiver<View>,
    intent_tx: mpsc::Sender<UiIntent>,
    intent_rx: mpsc::Receiver<UiIntent>,
    action_tx: mpsc::Sender<(u32, String)>,
    action_rx: mpsc::Receiver<(u32, String)>,
    open_url: Box<dyn Fn(&str) + Send + Sync>,
}

impl App {
    /// Builds the application from configuration: resolves sources,
    /// constructs adapters and filters, prepares channels.
    pub fn new(config: Config) -> Result<Self, DaemonError> {
        let syncer = Arc::new(Syncer::from_config(&config)?);
        if syncer.source_count() == 0 {
            return Err(DaemonError::NoSources);
        }

        let scheduler = NotificationScheduler::new(
            config.notifications.enabled,
            config
                .notifications
                .before
                .iter()
                .filter_map(|d| Duration::from_std(*d).ok())
                .collect(),
            chrono_grace(&config),
        );

        let (view_tx, view_rx) = watch::channel(View::loading());
        let (intent_tx, intent_rx) = mpsc::channel(32);
        let (action_tx, action_rx) = mpsc::channel(32);

        Ok(Self {
            config,
            syncer,
            state: Arc::new(RwLock::new(AppState {
                tracker: StalenessTracker::new(),
                hidden: HiddenRegistry::new(),
                first_sync_done: false,
            })),
            scheduler,
            notifier: Arc::new(DesktopNotifier::new("CalBar")),
            view_tx,
            view_rx,
            intent_tx,
            intent_rx,
            action_tx,
            action_rx,
            open_url: Box::new(open_with_xdg),
        })
    }

    /// Replaces the notifier capability (tests, embedders).
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replaces the open-url handler.
    pub fn with_open_url(mut self, open_url: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.open_url = Box::new(open_url);
        self
    }

    /// Sender for UI intents.
    pub fn intents(&self) -> mpsc::Sender<UiIntent> {
        self.intent_tx.clone()
    }

    /// Sender for notification action invocations `(id, action_key)`.
    pub fn actions(&self) -> mpsc::Sender<(u32, String)> {
        self.action_tx.clone()
    }

    /// Receiver of published views.
    pub fn views(&self) -> watch::Receiver<View> {
        self.view_rx.clone()
    }

    /// Runs until shutdown. Spawns the sync loop and consumes sync
    /// outcomes, UI intents, action invocations, and the 30-second
    /// notification tick.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            sources = self.syncer.source_count(),
            interval = ?self.syncer.interval(),
            "calbar running"
        );

        let (outcome_tx, mut outcome_rx) = mpsc::channel::<SyncOutcome>(4);
        tokio::spawn(self.syncer.clone().run(shutdown.clone(), outcome_tx));

        let mut notify_tick = tokio::time::interval(NOTIFY_TICK);
        notify_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                Some(outcome) = outcome_rx.recv() => self.on_sync(outcome).await,
                Some(intent) = self.intent_rx.recv() => self.on_intent(intent).await,
                Some((id, key)) = self.action_rx.recv() => self.on_action(id, &key),
                _ = notify_tick.tick() => self.on_notify_tick().await,
                _ = shutdown.changed() => {
                    info!("application loop stopped");
                    return;
                }
            }
        }
    }

    async fn on_sync(&mut self, outcome: SyncOutcome) {
        let now = Utc::now();
        let fatal = outcome.is_fatal();

        let events = {
            let mut state = self.state.write().await;
            state.tracker.apply(outcome, now);
            state.first_sync_done = true;
            let events = state.tracker.events().to_vec();
            state.hidden.gc(&events, chrono_grace(&self.config), now);
            events
        };

        if !fatal {
            self.publish_ics(events);
        }
        self.publish().await;
    }

    /// Writes the merged feed to the configured output path off the async
    /// workers.
    fn publish_ics(&self, events: Vec<Event>) {
        let path = self.config.sync.output_path();
        tokio::task::spawn_blocking(move || {
            if let Err(err) = store::write_ics(&path, &events) {
                warn!(path = %path.display(), error = %err, "failed to write calendar file");
            }
        });
    }

    async fn on_intent(&mut self, intent: UiIntent) {
        let now = Utc::now();
        match intent {
            UiIntent::Hide(uid) => {
                debug!(uid = %uid, "hiding event");
                let mut state = self.state.write().await;
                state.hidden.hide(&uid, now);
                let events = state.tracker.events().to_vec();
                state.hidden.gc(&events, chrono_grace(&self.config), now);
            }
            UiIntent::Unhide(uid) => {
                debug!(uid = %uid, "unhiding event");
                let mut state = self.state.write().await;
                state.hidden.unhide(&uid);
                let events = state.tracker.events().to_vec();
                state.hidden.gc(&events, chrono_grace(&self.config), now);
            }
            UiIntent::OpenUrl(url) => {
                debug!(url = %url, "opening url");
                (self.open_url)(&url);
                return;
            }
            UiIntent::Toggle => {
                debug!("toggle requested");
            }
        }
        // Mutations are acknowledged by republishing the view.
        self.publish().await;
    }

    /// Dispatches a notification action invocation.
    fn on_action(&self, id: u32, key: &str) {
        debug!(id = id, key = %key, "notification action");
        if key == "join" {
            if let Some(url) = self.scheduler.url_for_action(id) {
                (self.open_url)(url);
            }
        }
    }

    async fn on_notify_tick(&mut self) {
        let now = Utc::now();
        let visible = {
            let state = self.state.read().await;
            state.hidden.visible(state.tracker.events())
        };
        self.scheduler
            .check(self.notifier.as_ref(), &visible, now)
            .await;
        // The imminent indicator depends on wall time, so refresh the view
        // on the same cadence.
        self.publish().await;
    }

    /// Publishes a fresh view. The state lock is released before the view
    /// builder runs.
    async fn publish(&self) {
        let now = Utc::now();
        let interval = Duration::from_std(self.syncer.interval())
            .unwrap_or_else(|_| Duration::minutes(5));

        let (visible, hidden_events, loading, stale, last_sync_at) = {
            let state = self.state.read().await;
            let events = state.tracker.events();
            (
                state.hidden.visible(events),
                state.hidden.hidden(events),
                !state.first_sync_done,
                state.tracker.is_stale(now, interval),
                state.tracker.last_sync_at(),
            )
        };

        let status: Status = derive_status(loading, stale, &visible, now);
        let view = build_view(
            &visible,
            &hidden_events,
            status,
            last_sync_at,
            now,
            chrono_duration(self.config.ui.time_range, Duration::days(7)),
            chrono_grace(&self.config),
        );
        let _ = self.view_tx.send(view);
    }
}

fn chrono_grace(config: &Config) -> Duration {
    chrono_duration(config.ui.event_end_grace, Duration::minutes(5))
}

fn chrono_duration(d: std::time::Duration, fallback: Duration) -> Duration {
    Duration::from_std(d).unwrap_or(fallback)
}

fn open_with_xdg(url: &str) {
    if let Err(err) = std::process::Command::new("xdg-open").arg(url).spawn() {
        warn!(url = %url, error = %err, "failed to open url");
    }
}
