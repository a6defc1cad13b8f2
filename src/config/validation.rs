//! Config validation: unknown-key detection with Levenshtein suggestions
//! and operational range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

use super::defaults;
use crate::types::Parameter;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

const THRESHOLD_FIELDS: [&str; 6] = [
    "normal_min",
    "normal_max",
    "spike_low",
    "spike_high",
    "drift_consecutive_readings",
    "dropout_threshold_seconds",
];

/// Returns the complete set of valid dotted key paths for MonitorConfig.
///
/// Must be kept in step with the struct hierarchy in monitor_config.rs.
pub fn known_config_keys() -> HashSet<String> {
    let mut keys: HashSet<String> = [
        "thresholds",
        "watchdog",
        "watchdog.tick_interval_ms",
        "storage",
        "storage.data_dir",
        "storage.anomalies_file",
        "storage.backend",
        "storage.flush_interval_secs",
        "storage.flush_on_append",
        "storage.default_recent_limit",
        "storage.retention_secs",
        "server",
        "server.addr",
    ]
    .iter()
    .map(|k| (*k).to_string())
    .collect();

    for parameter in Parameter::ALL {
        let section = format!("thresholds.{parameter}");
        for field in THRESHOLD_FIELDS {
            keys.insert(format!("{section}.{field}"));
        }
        keys.insert(section);
    }
    keys
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<String>) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by(|(ka, da), (kb, db)| da.cmp(db).then_with(|| ka.cmp(kb)))
        .map(|(k, _)| k.clone())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Never fails on unknown keys, it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Operational Range Validation
// ============================================================================

/// Validate storage settings and flag suspicious threshold magnitudes.
///
/// Returns (errors, warnings). Errors must prevent startup; warnings are
/// logged and ignored.
pub fn validate_operational_ranges(
    config: &super::MonitorConfig,
) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let s = &config.storage;
    if s.default_recent_limit == 0 {
        errors.push("storage.default_recent_limit must be > 0".to_string());
    }
    if s.flush_interval_secs == 0 {
        errors.push("storage.flush_interval_secs must be > 0".to_string());
    }
    if s.anomalies_file.trim().is_empty() {
        errors.push("storage.anomalies_file must not be empty".to_string());
    }

    for parameter in Parameter::ALL {
        let t = config.thresholds.get(parameter);
        if t.drift_consecutive_readings > 10_000 {
            warnings.push(ValidationWarning {
                field: format!("thresholds.{parameter}.drift_consecutive_readings"),
                message: format!(
                    "thresholds.{parameter}.drift_consecutive_readings = {} is unusually large; drift may never be reported",
                    t.drift_consecutive_readings
                ),
                suggestion: None,
            });
        }
        if t.dropout_threshold_seconds > defaults::MAX_DROPOUT_THRESHOLD_SECS {
            errors.push(format!(
                "thresholds.{parameter}.dropout_threshold_seconds = {} exceeds the maximum of {} (one year)",
                t.dropout_threshold_seconds,
                defaults::MAX_DROPOUT_THRESHOLD_SECS
            ));
        } else if t.dropout_threshold_seconds > 86_400 {
            warnings.push(ValidationWarning {
                field: format!("thresholds.{parameter}.dropout_threshold_seconds"),
                message: format!(
                    "thresholds.{parameter}.dropout_threshold_seconds = {} exceeds one day",
                    t.dropout_threshold_seconds
                ),
                suggestion: None,
            });
        }
    }

    if let Some(retention) = s.retention_secs {
        if retention > defaults::MAX_RETENTION_SECS {
            errors.push(format!(
                "storage.retention_secs = {retention} exceeds the maximum of {} (100 years); use 0 to disable retention",
                defaults::MAX_RETENTION_SECS
            ));
        } else if retention > 0 && retention < s.flush_interval_secs {
            warnings.push(ValidationWarning {
                field: "storage.retention_secs".to_string(),
                message: format!(
                    "storage.retention_secs = {retention} is shorter than flush_interval_secs = {}",
                    s.flush_interval_secs
                ),
                suggestion: None,
            });
        }
    }

    (errors, warnings)
}
