//! Engine configuration loader for Orchestra.
//!
//! Reads `config.toml` (`~/.orchestra/config.toml` by default) and deserializes
//! it into [`EngineConfig`]. Falls back to defaults when the file is missing or
//! malformed.

use std::path::{Path, PathBuf};

use orchestra_types::config::EngineConfig;

/// Minimum step timeout accepted from configuration.
const MIN_STEP_TIMEOUT_MS: u64 = 1;

/// Default data directory (`~/.orchestra`), if a home directory exists.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".orchestra"))
}

/// Default config path (`~/.orchestra/config.toml`).
pub fn default_config_path() -> Option<PathBuf> {
    default_data_dir().map(|dir| dir.join("config.toml"))
}

/// Load engine configuration from `config_path`.
///
/// - If the file does not exist, returns [`EngineConfig::default()`].
/// - If the file exists but cannot be read or parsed, logs a warning and returns the default.
/// - Otherwise returns the parsed config with out-of-range values clamped.
pub async fn load_engine_config(config_path: &Path) -> EngineConfig {
    let content = match tokio::fs::read_to_string(config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => sanitize(config),
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
    }
}

fn sanitize(mut config: EngineConfig) -> EngineConfig {
    config.default_step_timeout_ms = config.default_step_timeout_ms.max(MIN_STEP_TIMEOUT_MS);
    config.event_bus_capacity = config.event_bus_capacity.max(1);
    config.default_min_confidence = if config.default_min_confidence.is_nan() {
        tracing::warn!("default_min_confidence is NaN, using the default");
        EngineConfig::default().default_min_confidence
    } else {
        config.default_min_confidence.clamp(0.0, 1.0)
    };
    config
}
