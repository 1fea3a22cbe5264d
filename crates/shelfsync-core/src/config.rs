//! Configuration types for shelfsync
//!
//! A [`SyncConfig`] is built once by the host (daemon, embedding app) and
//! handed to the [`SyncRunner`](crate::runner::SyncRunner) at construction.
//! Nothing in the core reads configuration from anywhere else.

use crate::mapping::FieldKey;
use chrono::{NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Main shelfsync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Remote server connection
    pub connection: ConnectionConfig,

    /// Which fields sync into which local columns
    #[serde(default)]
    pub columns: ColumnSelection,

    /// Daily scheduled sync
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Optional runner settings
    #[serde(default)]
    pub runner: RunnerConfig,
}

impl SyncConfig {
    /// Create a configuration with the given connection and defaults elsewhere
    pub fn new(connection: ConnectionConfig) -> Self {
        Self {
            connection,
            columns: ColumnSelection::default(),
            schedule: ScheduleConfig::default(),
            runner: RunnerConfig::default(),
        }
    }

    /// Set the column selection
    pub fn with_columns(mut self, columns: ColumnSelection) -> Self {
        self.columns = columns;
        self
    }

    /// Set the schedule
    pub fn with_schedule(mut self, schedule: ScheduleConfig) -> Self {
        self.schedule = schedule;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.connection.validate()?;
        self.columns.validate()?;
        self.schedule.validate()?;
        self.runner.validate()?;
        Ok(())
    }
}

/// Remote server connection parameters
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Server base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Library whose items are synced
    #[serde(default)]
    pub library_id: String,

    /// Bearer credential
    #[serde(default)]
    pub api_key: String,
}

// Keeps the credential out of logs
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("base_url", &self.base_url)
            .field("library_id", &self.library_id)
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

impl ConnectionConfig {
    /// Create a connection configuration
    pub fn new(
        base_url: impl Into<String>,
        library_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            library_id: library_id.into(),
            api_key: api_key.into(),
        }
    }

    /// Validate that the required parameters are present
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.api_key.is_empty() || self.library_id.is_empty() {
            return Err(crate::Error::config(
                "API Key or Library ID not set in configuration",
            ));
        }
        if self.base_url.is_empty() {
            return Err(crate::Error::config("Server URL cannot be empty"));
        }
        Ok(())
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// `GET` endpoint listing the library's items
    pub fn library_items_url(&self) -> String {
        format!("{}/api/libraries/{}/items", self.base(), self.library_id)
    }

    /// `GET` endpoint for the current user with embedded progress
    pub fn me_url(&self) -> String {
        format!("{}/api/me", self.base())
    }

    /// Unauthenticated liveness endpoint
    pub fn ping_url(&self) -> String {
        format!("{}/ping", self.base())
    }

    /// Web link to a remote item, for reports and identifier link rules
    pub fn item_url(&self, remote_id: &str) -> String {
        format!("{}/audiobookshelf/item/{}", self.base(), remote_id)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            library_id: String::new(),
            api_key: String::new(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:13378".to_string()
}

/// Destination column per syncable field
///
/// Absent keys and empty column names both mean "do not sync".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnSelection(BTreeMap<FieldKey, String>);

impl ColumnSelection {
    /// Create an empty selection (nothing syncs)
    pub fn new() -> Self {
        Self::default()
    }

    /// Sync `key` into `column`
    pub fn with(mut self, key: FieldKey, column: impl Into<String>) -> Self {
        self.0.insert(key, column.into());
        self
    }

    /// Destination column for a field, if sync is enabled for it
    pub fn column_for(&self, key: FieldKey) -> Option<&str> {
        self.0
            .get(&key)
            .map(String::as_str)
            .filter(|c| !c.is_empty())
    }

    /// Whether no field is enabled
    pub fn is_empty(&self) -> bool {
        self.0.values().all(String::is_empty)
    }

    /// Enabled (field, column) pairs
    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &str)> {
        self.0
            .iter()
            .filter(|(_, c)| !c.is_empty())
            .map(|(k, c)| (*k, c.as_str()))
    }

    /// Two fields writing the same column would race each other
    pub fn validate(&self) -> Result<(), crate::Error> {
        let mut seen: BTreeMap<&str, FieldKey> = BTreeMap::new();
        for (key, column) in self.iter() {
            if let Some(other) = seen.insert(column, key) {
                return Err(crate::Error::config(format!(
                    "Column {} is selected for both {} and {}",
                    column, other, key
                )));
            }
        }
        Ok(())
    }
}

/// Parses `field=column` pairs separated by commas
impl FromStr for ColumnSelection {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut selection = ColumnSelection::new();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, column) = pair.split_once('=').ok_or_else(|| {
                crate::Error::config(format!("Expected field=column, got: {}", pair))
            })?;
            selection = selection.with(key.trim().parse()?, column.trim());
        }
        Ok(selection)
    }
}

impl<'a> IntoIterator for &'a ColumnSelection {
    type Item = (&'a FieldKey, &'a String);
    type IntoIter = btree_map::Iter<'a, FieldKey, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Daily scheduled sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Whether the daemon keeps running a daily sync
    #[serde(default)]
    pub enabled: bool,

    /// Local hour of the daily run (0-23)
    #[serde(default = "default_schedule_hour")]
    pub hour: u32,

    /// Minute of the daily run (0-59)
    #[serde(default)]
    pub minute: u32,
}

impl ScheduleConfig {
    /// Validate hour and minute ranges
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.hour > 23 {
            return Err(crate::Error::config(format!(
                "Schedule hour must be between 0 and 23. Got: {}",
                self.hour
            )));
        }
        if self.minute > 59 {
            return Err(crate::Error::config(format!(
                "Schedule minute must be between 0 and 59. Got: {}",
                self.minute
            )));
        }
        Ok(())
    }

    /// Wait from `now` until the next hour:minute
    ///
    /// A target still ahead today is used as is; a target already passed
    /// rolls over to tomorrow.
    pub fn next_run_delay(&self, now: NaiveTime) -> Result<Duration, crate::Error> {
        let target = NaiveTime::from_hms_opt(self.hour, self.minute, 0).ok_or_else(|| {
            crate::Error::config(format!("Invalid schedule time {}:{}", self.hour, self.minute))
        })?;

        let mut wait = target - now;
        if wait < TimeDelta::zero() {
            wait += TimeDelta::days(1);
        }

        wait.to_std()
            .map_err(|e| crate::Error::config(format!("Invalid schedule delay: {}", e)))
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            hour: default_schedule_hour(),
            minute: 0,
        }
    }
}

fn default_schedule_hour() -> u32 {
    4
}

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Upper bound on each remote fetch, in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Capacity of the run event channel
    ///
    /// When full, new events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl RunnerConfig {
    /// Fetch timeout as a duration
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.fetch_timeout_secs == 0 {
            return Err(crate::Error::config("Fetch timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_fetch_timeout_secs() -> u64 {
    20
}

fn default_event_channel_capacity() -> usize {
    1000
}
