//! Ridesync configuration system.
//!
//! TOML-based configuration for the ride sync client: backend endpoints,
//! position tracking thresholds, request timeouts, storage, and logging.
//! All sections use defaults so partial configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ridesync_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! let json = config_to_json(&config);
//! println!("{json}");
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{RideSyncConfig, CONFIG_SCHEMA_VERSION};
pub use toml_loader::{load_default, load_from_path};

use ridesync_common::ConfigError;

/// Load config from the platform default path, creating a commented
/// default file when none exists.
pub fn load_config() -> Result<RideSyncConfig, ConfigError> {
    load_default()
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &RideSyncConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_to_json_contains_all_sections() {
        let config = RideSyncConfig::default();
        let json = config_to_json(&config);
        assert!(json.contains("\"connection\""));
        assert!(json.contains("\"api\""));
        assert!(json.contains("\"tracking\""));
        assert!(json.contains("\"requests\""));
        assert!(json.contains("\"storage\""));
        assert!(json.contains("\"logging\""));
    }

    #[test]
    fn config_schema_version_is_1() {
        assert_eq!(CONFIG_SCHEMA_VERSION, 1);
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let config = RideSyncConfig::default();
        let json = config_to_json(&config);
        let parsed: RideSyncConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.connection.auth_header, "access_token");
        assert_eq!(parsed.tracking.gesture_cooldown_ms, 3000);
        assert_eq!(parsed.requests.response_timeout_ms, 3000);
    }
}
