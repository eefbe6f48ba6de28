//! Engine configuration types for Orchestra.
//!
//! `EngineConfig` represents the top-level `config.toml` that sets engine-wide
//! fallbacks (step timeout, confidence threshold, retry backoff, event bus size).

use serde::{Deserialize, Serialize};

use crate::workflow::{DEFAULT_BACKOFF_MS, DEFAULT_MIN_CONFIDENCE, DEFAULT_STEP_TIMEOUT_MS};

/// Top-level configuration for the workflow engine.
///
/// Loaded from `~/.orchestra/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Step timeout used when neither the step nor the workflow sets one.
    #[serde(default = "default_step_timeout_ms")]
    pub default_step_timeout_ms: u64,

    /// Capacity of the lifecycle event broadcast channel.
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Confidence threshold for dependencies added with `add_dependent_step`.
    #[serde(default = "default_min_confidence")]
    pub default_min_confidence: f64,

    /// Retry backoff for steps built without an explicit retry policy.
    #[serde(default = "default_backoff_ms")]
    pub default_backoff_ms: u64,
}

fn default_step_timeout_ms() -> u64 {
    DEFAULT_STEP_TIMEOUT_MS
}

fn default_event_bus_capacity() -> usize {
    1024
}

fn default_min_confidence() -> f64 {
    DEFAULT_MIN_CONFIDENCE
}

fn default_backoff_ms() -> u64 {
    DEFAULT_BACKOFF_MS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_step_timeout_ms: default_step_timeout_ms(),
            event_bus_capacity: default_event_bus_capacity(),
            default_min_confidence: default_min_confidence(),
            default_backoff_ms: default_backoff_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.default_step_timeout_ms, 60_000);
        assert_eq!(config.event_bus_capacity, 1024);
        assert!((config.default_min_confidence - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.default_backoff_ms, 1_000);
    }

    #[test]
    fn test_engine_config_deserialize_with_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_engine_config_deserialize_partial() {
        let toml_str = r#"
default_step_timeout_ms = 15000
default_min_confidence = 0.5
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default_step_timeout_ms, 15_000);
        assert!((config.default_min_confidence - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.event_bus_capacity, 1024);
    }
}
