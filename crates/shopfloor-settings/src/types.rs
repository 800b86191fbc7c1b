//! Settings type definitions.
//!
//! Field names are camelCase in JSON. Every section is `#[serde(default)]`,
//! so a partial file only needs the keys it changes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root settings type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShopfloorSettings {
    pub database: DatabaseSettings,
    pub logging: LoggingSettings,
    pub sweep: SweepSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// SQLite file. Created on first open.
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
    /// Extra attempts a transaction gets after a busy/locked failure.
    pub max_tx_retries: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: crate::loader::shopfloor_dir().join("shopfloor.db"),
            busy_timeout_ms: 5_000,
            max_tx_retries: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `trace`, `debug`, `info`, `warn` or `error`. `RUST_LOG` wins over it.
    pub level: String,
    /// JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SweepSettings {
    /// Seconds between drift sweeps in `watch` mode.
    pub interval_secs: u64,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            interval_secs: 3_600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = ShopfloorSettings::default();
        assert!(s.database.path.ends_with(".shopfloor/shopfloor.db"));
        assert_eq!(s.database.busy_timeout_ms, 5_000);
        assert_eq!(s.database.max_tx_retries, 3);
        assert_eq!(s.logging.level, "info");
        assert!(!s.logging.json);
        assert_eq!(s.sweep.interval_secs, 3_600);
    }

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(ShopfloorSettings::default()).unwrap();
        assert!(value["database"].get("busyTimeoutMs").is_some());
        assert!(value["database"].get("maxTxRetries").is_some());
        assert!(value["sweep"].get("intervalSecs").is_some());
    }
}
