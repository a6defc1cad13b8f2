//! Monitor Configuration - thresholds, watchdog, storage and server settings
//!
//! Every field has a default in `defaults`, so an
//! empty or absent TOML file yields a working engine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;
use crate::types::Parameter;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "AQUASENSE_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "aquasense.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for an anomaly detector deployment.
///
/// Load with `MonitorConfig::load()` which searches:
/// 1. `$AQUASENSE_CONFIG` env var
/// 2. `./aquasense.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Per-parameter detection thresholds
    #[serde(default)]
    pub thresholds: ThresholdTable,

    /// Dropout watchdog scheduling
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Anomaly persistence and retrieval
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

impl MonitorConfig {
    /// Load configuration using the standard search order:
    /// 1. `$AQUASENSE_CONFIG` environment variable
    /// 2. `./aquasense.toml` in the current working directory
    /// 3. Built-in defaults
    ///
    /// A file that exists but fails to parse or validate is an error, never a
    /// silent fallback: the engine must not start on a broken threshold set.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if !p.exists() {
                return Err(ConfigError::Io(
                    p,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
                ));
            }
            let config = Self::load_from_file(&p)?;
            info!(path = %p.display(), "Loaded monitor config from {}", CONFIG_ENV_VAR);
            return Ok(config);
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            let config = Self::load_from_file(&local)?;
            info!(path = %local.display(), "Loaded monitor config");
            return Ok(config);
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        // Two-pass: check for unknown keys first (warnings only)
        for w in &super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate thresholds and scheduling settings for internal consistency.
    ///
    /// Rules:
    /// - `spike_low < normal_min <= normal_max < spike_high`, all finite
    /// - drift run length and dropout threshold must be > 0
    /// - an explicit watchdog tick must be shorter than every dropout threshold
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        for parameter in Parameter::ALL {
            self.thresholds.get(parameter).check(parameter, &mut errors);
        }

        if let Some(tick_ms) = self.watchdog.tick_interval_ms {
            let min_dropout_ms = self.thresholds.min_dropout_secs().saturating_mul(1000);
            if tick_ms == 0 {
                errors.push("watchdog.tick_interval_ms must be > 0".to_string());
            } else if tick_ms >= min_dropout_ms {
                errors.push(format!(
                    "watchdog.tick_interval_ms ({tick_ms}) must be shorter than the smallest dropout threshold ({min_dropout_ms} ms)"
                ));
            }
        }

        let (range_errors, range_warnings) = super::validation::validate_operational_ranges(self);
        errors.extend(range_errors);
        for w in &range_warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Watchdog tick: explicit setting, or a tenth of the smallest dropout
    /// threshold (never below `WATCHDOG_MIN_TICK_MS`).
    pub fn watchdog_tick(&self) -> Duration {
        let ms = self.watchdog.tick_interval_ms.unwrap_or_else(|| {
            (self.thresholds.min_dropout_secs().saturating_mul(1000) / defaults::WATCHDOG_TICK_DIVISOR)
                .max(defaults::WATCHDOG_MIN_TICK_MS)
        });
        Duration::from_millis(ms)
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Thresholds
// ============================================================================

/// Detection bounds for one parameter.
///
/// Invariant (checked by `MonitorConfig::validate`):
/// `spike_low < normal_min <= normal_max < spike_high`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterThresholds {
    pub normal_min: f64,
    pub normal_max: f64,
    pub spike_low: f64,
    pub spike_high: f64,

    /// Consecutive out-of-range readings that confirm a drift
    #[serde(default = "default_drift_readings")]
    pub drift_consecutive_readings: u32,

    /// Silence (seconds) before a dropout is reported
    #[serde(default = "default_dropout_secs")]
    pub dropout_threshold_seconds: u64,
}

fn default_drift_readings() -> u32 {
    defaults::DRIFT_CONSECUTIVE_READINGS
}
fn default_dropout_secs() -> u64 {
    defaults::DROPOUT_THRESHOLD_SECS
}

impl ParameterThresholds {
    pub fn new(spike_low: f64, normal_min: f64, normal_max: f64, spike_high: f64) -> Self {
        Self {
            normal_min,
            normal_max,
            spike_low,
            spike_high,
            drift_consecutive_readings: default_drift_readings(),
            dropout_threshold_seconds: default_dropout_secs(),
        }
    }

    pub fn with_drift_readings(mut self, readings: u32) -> Self {
        self.drift_consecutive_readings = readings;
        self
    }

    pub fn with_dropout_secs(mut self, secs: u64) -> Self {
        self.dropout_threshold_seconds = secs;
        self
    }

    fn check(&self, parameter: Parameter, errors: &mut Vec<String>) {
        let values = [self.spike_low, self.normal_min, self.normal_max, self.spike_high];
        // NaN comparisons silently pass
        if values.iter().any(|v| !v.is_finite()) {
            errors.push(format!(
                "thresholds.{parameter}: values must be finite (got spike_low={}, normal_min={}, normal_max={}, spike_high={})",
                self.spike_low, self.normal_min, self.normal_max, self.spike_high
            ));
            return;
        }
        if self.spike_low >= self.normal_min {
            errors.push(format!(
                "thresholds.{parameter}: spike_low ({}) must be < normal_min ({})",
                self.spike_low, self.normal_min
            ));
        }
        if self.normal_min > self.normal_max {
            errors.push(format!(
                "thresholds.{parameter}: normal_min ({}) must be <= normal_max ({})",
                self.normal_min, self.normal_max
            ));
        }
        if self.normal_max >= self.spike_high {
            errors.push(format!(
                "thresholds.{parameter}: normal_max ({}) must be < spike_high ({})",
                self.normal_max, self.spike_high
            ));
        }
        if self.drift_consecutive_readings == 0 {
            errors.push(format!(
                "thresholds.{parameter}.drift_consecutive_readings must be > 0"
            ));
        }
        if self.dropout_threshold_seconds == 0 {
            errors.push(format!(
                "thresholds.{parameter}.dropout_threshold_seconds must be > 0"
            ));
        }
    }
}

/// Thresholds for every monitored parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    #[serde(default = "default_temperature")]
    pub temperature: ParameterThresholds,

    #[serde(default = "default_pressure")]
    pub pressure: ParameterThresholds,

    #[serde(default = "default_flow")]
    pub flow: ParameterThresholds,
}

fn default_temperature() -> ParameterThresholds {
    ParameterThresholds::new(
        defaults::TEMP_SPIKE_LOW,
        defaults::TEMP_NORMAL_MIN,
        defaults::TEMP_NORMAL_MAX,
        defaults::TEMP_SPIKE_HIGH,
    )
}
fn default_pressure() -> ParameterThresholds {
    ParameterThresholds::new(
        defaults::PRESSURE_SPIKE_LOW,
        defaults::PRESSURE_NORMAL_MIN,
        defaults::PRESSURE_NORMAL_MAX,
        defaults::PRESSURE_SPIKE_HIGH,
    )
}
fn default_flow() -> ParameterThresholds {
    ParameterThresholds::new(
        defaults::FLOW_SPIKE_LOW,
        defaults::FLOW_NORMAL_MIN,
        defaults::FLOW_NORMAL_MAX,
        defaults::FLOW_SPIKE_HIGH,
    )
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            pressure: default_pressure(),
            flow: default_flow(),
        }
    }
}

impl ThresholdTable {
    /// Same thresholds for every parameter (handy for tests and single-channel rigs).
    pub fn uniform(thresholds: ParameterThresholds) -> Self {
        Self {
            temperature: thresholds.clone(),
            pressure: thresholds.clone(),
            flow: thresholds,
        }
    }

    pub fn get(&self, parameter: Parameter) -> &ParameterThresholds {
        match parameter {
            Parameter::Temperature => &self.temperature,
            Parameter::Pressure => &self.pressure,
            Parameter::Flow => &self.flow,
        }
    }

    pub fn min_dropout_secs(&self) -> u64 {
        Parameter::ALL
            .iter()
            .map(|p| self.get(*p).dropout_threshold_seconds)
            .min()
            .unwrap_or(defaults::DROPOUT_THRESHOLD_SECS)
    }
}

// ============================================================================
// Watchdog
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Explicit tick interval; derived from dropout thresholds when absent
    #[serde(default)]
    pub tick_interval_ms: Option<u64>,
}

// ============================================================================
// Storage
// ============================================================================

/// Durable backend for the anomaly log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Full snapshot rewritten as a JSON array
    #[default]
    Json,
    /// One sled record per anomaly
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// File (json) or directory (sled) name, relative to `data_dir`
    #[serde(default = "default_anomalies_file")]
    pub anomalies_file: String,

    #[serde(default)]
    pub backend: StorageBackend,

    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,

    /// Also flush as soon as an anomaly is appended
    #[serde(default = "default_true")]
    pub flush_on_append: bool,

    /// Size of the most-recent retrieval window when no limit is given
    #[serde(default = "default_recent_limit")]
    pub default_recent_limit: usize,

    /// Anomalies older than this are left out of recent retrieval (0 disables)
    #[serde(default = "default_retention")]
    pub retention_secs: Option<u64>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(defaults::DATA_DIR)
}
fn default_anomalies_file() -> String {
    defaults::ANOMALIES_FILE.to_string()
}
fn default_flush_interval() -> u64 {
    defaults::FLUSH_INTERVAL_SECS
}
fn default_true() -> bool {
    true
}
fn default_recent_limit() -> usize {
    defaults::DEFAULT_RECENT_LIMIT
}
fn default_retention() -> Option<u64> {
    Some(defaults::RETENTION_SECS)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            anomalies_file: default_anomalies_file(),
            backend: StorageBackend::default(),
            flush_interval_secs: default_flush_interval(),
            flush_on_append: default_true(),
            default_recent_limit: default_recent_limit(),
            retention_secs: default_retention(),
        }
    }
}

impl StorageConfig {
    /// Full path of the anomaly file (or sled directory).
    pub fn anomalies_path(&self) -> PathBuf {
        self.data_dir.join(&self.anomalies_file)
    }

    /// Effective retention window, `None` when disabled.
    pub fn retention(&self) -> Option<Duration> {
        self.retention_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
}

fn default_addr() -> String {
    defaults::SERVER_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: default_addr() }
    }
}
