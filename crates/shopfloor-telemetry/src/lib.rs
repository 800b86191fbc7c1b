//! Tracing subscriber setup for the shopfloor binary.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "shopfloor_store" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines on stderr instead of compact text.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build from a level name such as `"debug"`. Unknown names fall back
    /// to `INFO`.
    pub fn from_level_name(level: &str, json: bool) -> Self {
        Self {
            log_level: Level::from_str(level).unwrap_or(Level::INFO),
            json,
            ..Self::default()
        }
    }

    /// Directive string handed to `EnvFilter` when RUST_LOG is unset.
    pub fn filter_directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter
    }
}

/// Initialize the global subscriber. Call once at startup; a second call
/// returns an error instead of panicking.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives() {
        assert_eq!(TelemetryConfig::default().filter_directives(), "info");
    }

    #[test]
    fn module_levels_are_appended() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![
                ("shopfloor_engine".into(), Level::DEBUG),
                ("rusqlite".into(), Level::ERROR),
            ],
            json: true,
        };
        assert_eq!(
            config.filter_directives(),
            "warn,shopfloor_engine=debug,rusqlite=error"
        );
    }

    #[test]
    fn level_names() {
        assert_eq!(TelemetryConfig::from_level_name("debug", false).log_level, Level::DEBUG);
        assert_eq!(TelemetryConfig::from_level_name("TRACE", false).log_level, Level::TRACE);
        assert_eq!(TelemetryConfig::from_level_name("chatty", true).log_level, Level::INFO);
        assert!(TelemetryConfig::from_level_name("info", true).json);
    }
}
