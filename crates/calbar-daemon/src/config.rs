//! YAML configuration loading and source resolution.
//!
//! Connection details for a source are either inline (`url`, `username`,
//! `password`, each with a `_cmd` variant that shells out for the value) or
//! produced wholesale by a `config_cmd`. The two forms are mutually
//! exclusive. Duration fields accept `d` and `w` suffixes on top of the
//! usual units.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use directories::BaseDirs;
use serde::Deserialize;
use thiserror::Error;

use calbar_core::{FilterConfig, parse_duration};

/// Errors from loading or resolving configuration. All fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("{0}")]
    Validation(String),
    #[error("source {name:?}: {message}")]
    Command { name: String, message: String },
}

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub sources: Vec<SourceConfig>,
    /// Global filter. Kept for config compatibility; only per-source
    /// filters are applied by the sync engine.
    pub filters: FilterConfig,
    pub notifications: NotificationConfig,
    pub ui: UiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            sources: Vec::new(),
            filters: FilterConfig::default(),
            notifications: NotificationConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

/// Sync loop settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Sync tick period.
    #[serde(deserialize_with = "de_duration")]
    pub interval: Duration,
    /// How far ahead to fetch.
    #[serde(deserialize_with = "de_duration")]
    pub time_range: Duration,
    /// Where to publish the merged ICS file; `~` expands to the home
    /// directory. Defaults to `~/.local/share/calbar/calendar.ics`.
    pub output: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            time_range: Duration::from_secs(14 * 24 * 3600),
            output: None,
        }
    }
}

impl SyncConfig {
    /// The resolved output path.
    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(path) => expand_path(path),
            None => BaseDirs::new()
                .map(|dirs| dirs.home_dir().join(".local/share/calbar/calendar.ics"))
                .unwrap_or_else(|| PathBuf::from("calendar.ics")),
        }
    }
}

/// Desktop notification settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    /// Lead times before an event start at which to notify.
    #[serde(deserialize_with = "de_duration_list")]
    pub before: Vec<Duration>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            before: vec![Duration::from_secs(15 * 60), Duration::from_secs(5 * 60)],
        }
    }
}

/// View settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// View horizon.
    #[serde(deserialize_with = "de_duration")]
    pub time_range: Duration,
    /// How long past-end events stay visible.
    #[serde(deserialize_with = "de_duration")]
    pub event_end_grace: Duration,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            time_range: Duration::from_secs(7 * 24 * 3600),
            event_end_grace: Duration::from_secs(5 * 60),
        }
    }
}

/// One configured calendar source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub name: String,
    /// Command whose output (YAML) supplies the connection config.
    /// Mutually exclusive with every inline connection field.
    #[serde(default)]
    pub config_cmd: Option<String>,
    /// Per-source include/exclude rules.
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(flatten)]
    pub connection: ConnectionConfig,
}

/// Inline connection fields for a source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// `ics`, `caldav`, `icloud`, or `ms365`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub url: Option<String>,
    pub url_cmd: Option<String>,
    pub username: Option<String>,
    pub username_cmd: Option<String>,
    pub password: Option<String>,
    pub password_cmd: Option<String>,
    /// For CalDAV/iCloud: which calendars to sync (empty = all).
    pub calendars: Vec<String>,
}

impl ConnectionConfig {
    fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.url.is_none()
            && self.url_cmd.is_none()
            && self.username.is_none()
            && self.username_cmd.is_none()
            && self.password.is_none()
            && self.password_cmd.is_none()
            && self.calendars.is_empty()
    }
}

/// A source with all connection details resolved to plaintext.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub name: String,
    pub kind: String,
    pub url: String,
    pub username: String,
    pub password: String,
    pub calendars: Vec<String>,
    pub filters: FilterConfig,
}

impl SourceConfig {
    /// Checks structural validity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Validation("source name is required".into()));
        }
        if self.config_cmd.is_some() {
            if !self.connection.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "source {:?}: config_cmd and inline connection fields are mutually exclusive",
                    self.name
                )));
            }
            return Ok(());
        }
        if self.connection.kind.is_none() {
            return Err(ConfigError::Validation(format!(
                "source {:?}: type is required when config_cmd is not set",
                self.name
            )));
        }
        Ok(())
    }

    /// Resolves the source, executing `config_cmd` or the per-field `_cmd`
    /// commands as needed. Direct values take precedence over commands.
    pub fn resolve(&self) -> Result<ResolvedSource, ConfigError> {
        self.validate()?;

        let connection = match &self.config_cmd {
            None => self.connection.clone(),
            Some(cmd) => {
                let output = self.run(cmd)?;
                let connection: ConnectionConfig =
                    serde_yaml::from_str(&output).map_err(|e| ConfigError::Command {
                        name: self.name.clone(),
                        message: format!("parse config_cmd output: {e}"),
                    })?;
                if connection.kind.is_none() {
                    return Err(ConfigError::Command {
                        name: self.name.clone(),
                        message: "config_cmd output must include 'type'".into(),
                    });
                }
                connection
            }
        };

        Ok(ResolvedSource {
            name: self.name.clone(),
            kind: connection.kind.clone().unwrap_or_default(),
            url: self.value_or_cmd(&connection.url, &connection.url_cmd)?,
            username: self.value_or_cmd(&connection.username, &connection.username_cmd)?,
            password: self.value_or_cmd(&connection.password, &connection.password_cmd)?,
            calendars: connection.calendars,
            filters: self.filters.clone(),
        })
    }

    fn value_or_cmd(
        &self,
        value: &Option<String>,
        cmd: &Option<String>,
    ) -> Result<String, ConfigError> {
        if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
            return Ok(v.to_string());
        }
        match cmd.as_deref().filter(|c| !c.is_empty()) {
            Some(cmd) => self.run(cmd),
            None => Ok(String::new()),
        }
    }

    fn run(&self, command: &str) -> Result<String, ConfigError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .map_err(|e| ConfigError::Command {
                name: self.name.clone(),
                message: format!("execute command: {e}"),
            })?;
        if !output.status.success() {
            return Err(ConfigError::Command {
                name: self.name.clone(),
                message: format!("command exited with {}", output.status),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Config {
    /// Loads from the default location,
    /// `~/.config/calbar/config.yaml`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("calbar/config.yaml"))
            .ok_or_else(|| ConfigError::Validation("cannot determine config dir".into()))?;
        Self::load_from(&path)
    }

    /// Loads from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(expand_path(&path.to_string_lossy()))?;
        Self::parse(&text)
    }

    /// Parses configuration YAML.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(text)?;
        for source in &config.sources {
            source.validate()?;
        }
        Ok(config)
    }
}

fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}

fn de_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn de_duration_list<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    raw.iter()
        .map(|s| parse_duration(s).map_err(serde::de::Error::custom))
        .collect()
}
