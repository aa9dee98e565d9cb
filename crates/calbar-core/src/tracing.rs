//! Tracing setup shared by the daemon and any embedding binary.
//!
//! `RUST_LOG` overrides the configured default level.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Errors from tracing initialization.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable single-line output.
    #[default]
    Compact,
    /// Multi-line pretty output for interactive debugging.
    Pretty,
    /// JSON output for log collection.
    Json,
}

/// Configuration for [`init_tracing`].
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level used when `RUST_LOG` is not set.
    pub default_level: Level,
    pub format: TracingFormat,
    /// Include module targets in output.
    pub include_target: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            format: TracingFormat::Compact,
            include_target: true,
        }
    }
}

impl TracingConfig {
    /// Verbose configuration for `--verbose` runs.
    #[must_use]
    pub fn verbose() -> Self {
        Self {
            default_level: Level::DEBUG,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }
}

/// Initializes the global tracing subscriber. Call once at startup.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("calbar={}", config.default_level)));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        TracingFormat::Compact => {
            let layer = fmt::layer().compact().with_target(config.include_target);
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
        TracingFormat::Pretty => {
            let layer = fmt::layer().pretty().with_target(config.include_target);
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
        TracingFormat::Json => {
            let layer = fmt::layer().json().with_target(config.include_target);
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.default_level, Level::INFO);
        assert_eq!(config.format, TracingFormat::Compact);
        assert!(config.include_target);
    }

    #[test]
    fn verbose_config() {
        let config = TracingConfig::verbose();
        assert_eq!(config.default_level, Level::DEBUG);
    }
}
