//! Configuration loaded from `AUDIT_*` environment variables.
//!
//! ```ignore
//! use auditrail::config::AuditConfig;
//!
//! // AUDIT_BURST_THRESHOLD=20 AUDIT_LOG_FORMAT=json
//! let config = AuditConfig::from_env()?;
//! let monitor = RealTimeMonitor::new(config.monitor());
//! ```

use crate::error::Result;
use crate::metadata::MAX_METADATA_BYTES;
use serde::Deserialize;
use std::time::Duration;

pub const ENV_PREFIX: &str = "AUDIT_";

fn default_buffer_capacity() -> usize {
    1000
}
fn default_burst_window_secs() -> u64 {
    120
}
fn default_burst_threshold() -> usize {
    10
}
fn default_failure_window_secs() -> u64 {
    300
}
fn default_failure_threshold() -> usize {
    5
}
fn default_anomaly_window_secs() -> u64 {
    3600
}
fn default_anomaly_lookback_windows() -> u32 {
    24
}
fn default_anomaly_multiplier() -> f64 {
    3.0
}
fn default_anomaly_min_events() -> u64 {
    1
}
fn default_trend_days() -> u32 {
    7
}
fn default_max_metadata_bytes() -> usize {
    MAX_METADATA_BYTES
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Operational log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Every tunable, flat so it maps one-to-one onto environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default = "default_burst_window_secs")]
    pub burst_window_secs: u64,
    #[serde(default = "default_burst_threshold")]
    pub burst_threshold: usize,
    #[serde(default = "default_failure_window_secs")]
    pub failure_window_secs: u64,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,
    #[serde(default = "default_anomaly_window_secs")]
    pub anomaly_window_secs: u64,
    #[serde(default = "default_anomaly_lookback_windows")]
    pub anomaly_lookback_windows: u32,
    #[serde(default = "default_anomaly_multiplier")]
    pub anomaly_multiplier: f64,
    #[serde(default)]
    pub anomaly_absolute_threshold: Option<u64>,
    #[serde(default = "default_anomaly_min_events")]
    pub anomaly_min_events: u64,
    #[serde(default = "default_trend_days")]
    pub trend_days: u32,
    #[serde(default = "default_max_metadata_bytes")]
    pub max_metadata_bytes: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            burst_window_secs: default_burst_window_secs(),
            burst_threshold: default_burst_threshold(),
            failure_window_secs: default_failure_window_secs(),
            failure_threshold: default_failure_threshold(),
            anomaly_window_secs: default_anomaly_window_secs(),
            anomaly_lookback_windows: default_anomaly_lookback_windows(),
            anomaly_multiplier: default_anomaly_multiplier(),
            anomaly_absolute_threshold: None,
            anomaly_min_events: default_anomaly_min_events(),
            trend_days: default_trend_days(),
            max_metadata_bytes: default_max_metadata_bytes(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl AuditConfig {
    /// Load `.env` (if present), then read `AUDIT_*` variables.
    ///
    /// Existing environment variables take precedence over `.env` values.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Ok(envy::prefixed(ENV_PREFIX).from_env::<AuditConfig>()?)
    }

    /// Read from explicit `(NAME, value)` pairs, prefix included.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::prefixed(ENV_PREFIX).from_iter::<_, AuditConfig>(pairs)?)
    }

    pub fn monitor(&self) -> MonitorConfig {
        MonitorConfig {
            buffer_capacity: self.buffer_capacity,
            burst_window: Duration::from_secs(self.burst_window_secs),
            burst_threshold: self.burst_threshold,
            failure_window: Duration::from_secs(self.failure_window_secs),
            failure_threshold: self.failure_threshold,
        }
    }

    pub fn anomaly(&self) -> AnomalyConfig {
        AnomalyConfig {
            window: Duration::from_secs(self.anomaly_window_secs),
            lookback_windows: self.anomaly_lookback_windows,
            multiplier: self.anomaly_multiplier,
            absolute_threshold: self.anomaly_absolute_threshold,
            min_events: self.anomaly_min_events,
        }
    }

    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            format: self.log_format,
        }
    }
}

/// Real-time monitor tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Ring buffer size; the oldest event is evicted beyond this.
    pub buffer_capacity: usize,
    pub burst_window: Duration,
    /// Events within `burst_window` that raise a burst alert.
    pub burst_threshold: usize,
    pub failure_window: Duration,
    /// Failures of one action within `failure_window` that raise a streak alert.
    pub failure_threshold: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        AuditConfig::default().monitor()
    }
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn burst(mut self, window: Duration, threshold: usize) -> Self {
        self.burst_window = window;
        self.burst_threshold = threshold;
        self
    }

    pub fn failure_streak(mut self, window: Duration, threshold: usize) -> Self {
        self.failure_window = window;
        self.failure_threshold = threshold;
        self
    }
}

/// Volume anomaly detection tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyConfig {
    /// Length of the current window and of each historical window.
    pub window: Duration,
    /// Historical windows averaged into the baseline.
    pub lookback_windows: u32,
    /// Current count must exceed `multiplier * baseline`.
    pub multiplier: f64,
    /// Fixed threshold used instead of the multiplier when set.
    pub absolute_threshold: Option<u64>,
    /// Counts below this are never anomalous.
    pub min_events: u64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        AuditConfig::default().anomaly()
    }
}

impl AnomalyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(mut self, window: Duration, lookback_windows: u32) -> Self {
        self.window = window;
        self.lookback_windows = lookback_windows;
        self
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn absolute_threshold(mut self, threshold: u64) -> Self {
        self.absolute_threshold = Some(threshold);
        self
    }

    pub fn min_events(mut self, min_events: u64) -> Self {
        self.min_events = min_events;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        AuditConfig::default().logging()
    }
}
