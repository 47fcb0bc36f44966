//! Engine configuration.

use std::path::Path;
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;

/// Errors from loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown time zone: {0}")]
    UnknownTimeZone(String),
}

/// How far back a GTFS-RT delay is copied to earlier stops that have no
/// update of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackwardsDelayPropagation {
    /// Only where needed to keep times valid, and mark those stops as
    /// having no data.
    #[default]
    RequiredNoData,
    /// Only where needed to keep times valid.
    Required,
    /// All earlier stops without an update.
    Always,
}

/// Configuration of the real-time engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Feed the real-time sources belong to.
    #[serde(default = "EngineConfig::default_feed_id")]
    pub feed_id: String,

    /// IANA zone used to turn absolute times into service-day times.
    #[serde(default = "EngineConfig::default_time_zone")]
    pub time_zone: String,

    /// Minimum time between two snapshot commits (milliseconds).
    /// Forced commits ignore this.
    #[serde(default = "EngineConfig::default_max_snapshot_frequency_ms")]
    pub max_snapshot_frequency_ms: u64,

    /// Drop real-time data for past service dates once per day.
    #[serde(default = "EngineConfig::default_purge_expired_data")]
    pub purge_expired_data: bool,

    /// How many days before today real-time data is kept when purging.
    #[serde(default = "EngineConfig::default_retention_days")]
    pub retention_days: u32,

    /// Match journeys without a usable id against the schedule by time.
    #[serde(default)]
    pub fuzzy_trip_matching: bool,

    /// Lowest fraction of matching stations accepted by fuzzy matching.
    #[serde(default = "EngineConfig::default_fuzzy_min_score")]
    pub fuzzy_min_score: f64,

    #[serde(default)]
    pub backwards_delay_propagation: BackwardsDelayPropagation,

    /// Upper bound for absolute times of added GTFS-RT trips (seconds).
    #[serde(default = "EngineConfig::default_max_trip_time_secs")]
    pub max_trip_time_secs: i32,
}

impl EngineConfig {
    fn default_feed_id() -> String {
        "RB".to_string()
    }
    fn default_time_zone() -> String {
        "Europe/Oslo".to_string()
    }
    fn default_max_snapshot_frequency_ms() -> u64 {
        1000
    }
    fn default_purge_expired_data() -> bool {
        true
    }
    fn default_retention_days() -> u32 {
        1
    }
    fn default_fuzzy_min_score() -> f64 {
        0.5
    }
    fn default_max_trip_time_secs() -> i32 {
        48 * 3600
    }

    /// Read a JSON configuration file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&contents)?;
        config.zone()?;
        Ok(config)
    }

    /// Returns the configured time zone.
    pub fn zone(&self) -> Result<Tz, ConfigError> {
        self.time_zone
            .parse()
            .map_err(|_| ConfigError::UnknownTimeZone(self.time_zone.clone()))
    }

    /// Returns the minimum commit interval as a Duration.
    pub fn max_snapshot_frequency(&self) -> Duration {
        Duration::from_millis(self.max_snapshot_frequency_ms)
    }

    /// Returns the retention window as a chrono Duration.
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            feed_id: Self::default_feed_id(),
            time_zone: Self::default_time_zone(),
            max_snapshot_frequency_ms: Self::default_max_snapshot_frequency_ms(),
            purge_expired_data: Self::default_purge_expired_data(),
            retention_days: Self::default_retention_days(),
            fuzzy_trip_matching: false,
            fuzzy_min_score: Self::default_fuzzy_min_score(),
            backwards_delay_propagation: BackwardsDelayPropagation::default(),
            max_trip_time_secs: Self::default_max_trip_time_secs(),
        }
    }
}
