//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ShopfloorSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `SHOPFLOOR_*` environment overrides (highest priority)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::ShopfloorSettings;

/// `~/.shopfloor`, or `/tmp/.shopfloor` without a home directory.
pub fn shopfloor_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".shopfloor")
}

/// Resolve the path to the settings file (`~/.shopfloor/settings.json`).
pub fn settings_path() -> PathBuf {
    shopfloor_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ShopfloorSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ShopfloorSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<ShopfloorSettings> {
    let defaults = serde_json::to_value(ShopfloorSettings::default())?;
    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };
    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `SHOPFLOOR_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut ShopfloorSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from any key lookup. Invalid values are logged and
/// ignored, leaving the file/default value in place.
pub fn apply_overrides<F>(settings: &mut ShopfloorSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("SHOPFLOOR_DB_PATH") {
        settings.database.path = PathBuf::from(v);
    }
    if let Some(v) = read("SHOPFLOOR_TX_MAX_RETRIES") {
        match parse_u64_range(&v, 0, 20) {
            Some(n) => settings.database.max_tx_retries = n as u32,
            None => warn!(key = "SHOPFLOOR_TX_MAX_RETRIES", value = %v, "invalid env var, ignoring"),
        }
    }
    if let Some(v) = read("SHOPFLOOR_LOG_LEVEL") {
        settings.logging.level = v.to_lowercase();
    }
    if let Some(v) = read("SHOPFLOOR_LOG_JSON") {
        match parse_bool(&v) {
            Some(b) => settings.logging.json = b,
            None => warn!(key = "SHOPFLOOR_LOG_JSON", value = %v, "invalid boolean env var, ignoring"),
        }
    }
    if let Some(v) = read("SHOPFLOOR_SWEEP_INTERVAL_SECS") {
        match parse_u64_range(&v, 1, 7 * 24 * 3_600) {
            Some(n) => settings.sweep.interval_secs = n,
            None => warn!(key = "SHOPFLOOR_SWEEP_INTERVAL_SECS", value = %v, "invalid env var, ignoring"),
        }
    }
}

fn validate(settings: &ShopfloorSettings) -> Result<()> {
    const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
    if !LEVELS.contains(&settings.logging.level.as_str()) {
        return Err(SettingsError::InvalidValue(format!(
            "unknown log level {:?}",
            settings.logging.level
        )));
    }
    if settings.sweep.interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "sweep interval must be positive".into(),
        ));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"database": {"path": "a.db", "maxTxRetries": 3}});
        let source = serde_json::json!({"database": {"maxTxRetries": 7}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["database"]["maxTxRetries"], 7);
        assert_eq!(merged["database"]["path"], "a.db");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_and_primitive_replace() {
        let merged = deep_merge(
            serde_json::json!({"items": [1, 2, 3], "x": {"y": 1}}),
            serde_json::json!({"items": [4], "x": 5}),
        );
        assert_eq!(merged["items"], serde_json::json!([4]));
        assert_eq!(merged["x"], 5);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let settings = load_file_layer(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings, ShopfloorSettings::default());
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"database": {"path": "/srv/plant.db"}, "sweep": {"intervalSecs": 60}}"#,
        )
        .unwrap();

        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.database.path, PathBuf::from("/srv/plant.db"));
        assert_eq!(settings.database.busy_timeout_ms, 5_000);
        assert_eq!(settings.sweep.interval_secs, 60);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert!(matches!(load_file_layer(&path), Err(SettingsError::Json(_))));
    }

    #[test]
    fn validation_rejects_bad_level_and_zero_interval() {
        let mut settings = ShopfloorSettings::default();
        settings.logging.level = "loud".into();
        assert!(matches!(validate(&settings), Err(SettingsError::InvalidValue(_))));

        let mut settings = ShopfloorSettings::default();
        settings.sweep.interval_secs = 0;
        assert!(validate(&settings).is_err());
        assert!(validate(&ShopfloorSettings::default()).is_ok());
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply() {
        let mut settings = ShopfloorSettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                ("SHOPFLOOR_DB_PATH", "/data/floor.db"),
                ("SHOPFLOOR_LOG_LEVEL", "DEBUG"),
                ("SHOPFLOOR_LOG_JSON", "yes"),
                ("SHOPFLOOR_SWEEP_INTERVAL_SECS", "900"),
                ("SHOPFLOOR_TX_MAX_RETRIES", "5"),
            ]),
        );
        assert_eq!(settings.database.path, PathBuf::from("/data/floor.db"));
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
        assert_eq!(settings.sweep.interval_secs, 900);
        assert_eq!(settings.database.max_tx_retries, 5);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut settings = ShopfloorSettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                ("SHOPFLOOR_LOG_JSON", "maybe"),
                ("SHOPFLOOR_SWEEP_INTERVAL_SECS", "0"),
                ("SHOPFLOOR_TX_MAX_RETRIES", "lots"),
                ("SHOPFLOOR_DB_PATH", ""),
            ]),
        );
        assert_eq!(settings, ShopfloorSettings::default());
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in ["true", "1", "yes", "on", "TRUE"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in ["false", "0", "no", "off", "Off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("60", 1, 100), Some(60));
        assert_eq!(parse_u64_range("0", 1, 100), None);
        assert_eq!(parse_u64_range("101", 1, 100), None);
        assert_eq!(parse_u64_range("abc", 1, 100), None);
    }
}
