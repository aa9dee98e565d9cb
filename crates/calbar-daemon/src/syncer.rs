//! Multi-source synchronization: concurrent fan-out, partial-failure
//! fan-in, merge.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use calbar_core::{Event, EventFilter, merge};
use calbar_sources::{CalDavSource, FetchError, IcsSource, Ms365Source, Source};

use crate::config::{Config, ResolvedSource};
use crate::error::DaemonError;

/// A source paired with its compiled per-source filter.
struct SourceSpec {
    source: Arc<dyn Source>,
    filter: Arc<EventFilter>,
}

/// Per-source accounting for one round.
#[derive(Debug)]
pub struct SourceResult {
    pub name: String,
    pub events: Vec<Event>,
    /// Event count before the per-source filter ran.
    pub pre_filter_count: usize,
    /// Event count after the per-source filter ran.
    pub post_filter_count: usize,
    pub err: Option<FetchError>,
}

/// The outcome of one sync round.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Merged events from all successful sources, sorted by start.
    pub events: Vec<Event>,
    /// Names of sources that failed this round.
    pub failed_sources: Vec<String>,
    /// The round's representative error (the first one observed), present
    /// whenever any source failed.
    pub error: Option<FetchError>,
}

impl SyncOutcome {
    /// A fatal round produced no events at all while something failed; the
    /// prior snapshot should be kept untouched.
    pub fn is_fatal(&self) -> bool {
        self.events.is_empty() && self.error.is_some()
    }
}

/// Fans out to all configured sources and merges the results.
pub struct Syncer {
    sources: Vec<SourceSpec>,
    interval: Duration,
    time_range: chrono::Duration,
}

impl Syncer {
    /// Builds sources and filters from configuration. Sources with an
    /// unknown `type` are skipped with a warning.
    pub fn from_config(config: &Config) -> Result<Self, DaemonError> {
        let mut sources = Vec::new();

        for source_config in &config.sources {
            let resolved = source_config.resolve()?;
            match build_source(&resolved)? {
                Some(source) => {
                    let filter = EventFilter::compile(&resolved.filters).map_err(|e| {
                        DaemonError::Filter {
                            name: resolved.name.clone(),
                            source: e,
                        }
                    })?;
                    sources.push(SourceSpec {
                        source,
                        filter: Arc::new(filter),
                    });
                }
                None => {
                    warn!(name = %resolved.name, kind = %resolved.kind, "unknown source type");
                }
            }
        }

        Ok(Self {
            sources,
            interval: config.sync.interval,
            time_range: chrono::Duration::from_std(config.sync.time_range)
                .unwrap_or_else(|_| chrono::Duration::days(14)),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Runs one sync round: concurrent fetches, per-source filters,
    /// fan-in with failure accounting, merge.
    pub async fn sync(&self) -> SyncOutcome {
        info!(sources = self.sources.len(), "starting sync");
        let end = Utc::now() + self.time_range;

        let mut tasks = JoinSet::new();
        for spec in &self.sources {
            let source = spec.source.clone();
            let filter = spec.filter.clone();
            tasks.spawn(async move {
                let name = source.name().to_string();
                debug!(name = %name, "fetching source");

                match source.fetch(end).await {
                    Ok(events) => {
                        let pre_filter_count = events.len();
                        let events = filter.apply(events);
                        SourceResult {
                            name,
                            post_filter_count: events.len(),
                            pre_filter_count,
                            events,
                            err: None,
                        }
                    }
                    Err(err) => SourceResult {
                        name,
                        events: Vec::new(),
                        pre_filter_count: 0,
                        post_filter_count: 0,
                        err: Some(err),
                    },
                }
            });
        }

        let mut event_sets = Vec::new();
        let mut failed_sources = Vec::new();
        let mut first_error = None;

        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(err) => {
                    warn!(error = %err, "fetch task panicked");
                    continue;
                }
            };

            match result.err {
                Some(err) => {
                    warn!(name = %result.name, error = %err, "failed to fetch source");
                    failed_sources.push(result.name);
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                None => {
                    info!(
                        name = %result.name,
                        fetched = result.pre_filter_count,
                        after_filter = result.post_filter_count,
                        "fetched source"
                    );
                    event_sets.push(result.events);
                }
            }
        }

        let events = merge(event_sets);
        info!(
            events = events.len(),
            failed_sources = failed_sources.len(),
            "sync complete"
        );

        SyncOutcome {
            events,
            failed_sources,
            error: first_error,
        }
    }

    /// Runs the sync loop: one immediate round, then one per interval until
    /// shutdown. Ticks are edge-triggered; one that fires while a round is
    /// in flight is dropped, not queued. Shutdown cancels in-flight fetches
    /// by dropping the round.
    pub async fn run(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
        outcomes: tokio::sync::mpsc::Sender<SyncOutcome>,
    ) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of a tokio interval is immediate, which doubles as
        // the initial sync.
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = tokio::select! {
                        outcome = self.sync() => outcome,
                        _ = shutdown.changed() => return,
                    };
                    if outcomes.send(outcome).await.is_err() {
                        return;
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    }
}

fn build_source(resolved: &ResolvedSource) -> Result<Option<Arc<dyn Source>>, DaemonError> {
    let wrap = |e: FetchError| DaemonError::Source {
        name: resolved.name.clone(),
        source: e,
    };

    let source: Arc<dyn Source> = match resolved.kind.as_str() {
        "ics" => Arc::new(
            IcsSource::new(
                &resolved.name,
                &resolved.url,
                &resolved.username,
                &resolved.password,
            )
            .map_err(wrap)?,
        ),
        "caldav" => Arc::new(
            CalDavSource::new(
                &resolved.name,
                &resolved.url,
                &resolved.username,
                &resolved.password,
                resolved.calendars.clone(),
            )
            .map_err(wrap)?,
        ),
        "icloud" => Arc::new(
            CalDavSource::icloud(
                &resolved.name,
                &resolved.username,
                &resolved.password,
                resolved.calendars.clone(),
            )
            .map_err(wrap)?,
        ),
        // The external resolver supplies a bearer token through the
        // password field (or password_cmd).
        "ms365" => {
            Arc::new(Ms365Source::with_token(&resolved.name, &resolved.password).map_err(wrap)?)
        }
        _ => return Ok(None),
    };
    Ok(Some(source))
}
