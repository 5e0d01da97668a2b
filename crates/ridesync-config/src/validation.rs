//! Full configuration validation.
//!
//! Checks numeric ranges, endpoint schemes, and coordinate bounds,
//! collecting every violation into a single error.

use crate::schema::RideSyncConfig;
use ridesync_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &RideSyncConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    // Connection
    if !(config.connection.url.starts_with("ws://") || config.connection.url.starts_with("wss://"))
    {
        errors.push(format!(
            "connection.url = {:?} must start with ws:// or wss://",
            config.connection.url
        ));
    }
    if config.connection.auth_header.trim().is_empty() {
        errors.push("connection.auth_header must not be empty".into());
    }
    validate_range(
        &mut errors,
        "connection.connect_timeout_secs",
        config.connection.connect_timeout_secs,
        1,
        120,
    );
    validate_range(
        &mut errors,
        "connection.outbound_buffer",
        config.connection.outbound_buffer as u64,
        1,
        4096,
    );

    // REST
    if !(config.api.base_url.starts_with("http://") || config.api.base_url.starts_with("https://"))
    {
        errors.push(format!(
            "api.base_url = {:?} must start with http:// or https://",
            config.api.base_url
        ));
    }
    validate_range(
        &mut errors,
        "api.request_timeout_secs",
        config.api.request_timeout_secs,
        1,
        300,
    );

    // Tracking
    validate_range(
        &mut errors,
        "tracking.gesture_cooldown_ms",
        config.tracking.gesture_cooldown_ms,
        0,
        60_000,
    );
    if !(config.tracking.service_radius_km.is_finite() && config.tracking.service_radius_km > 0.0)
    {
        errors.push(format!(
            "tracking.service_radius_km = {} must be a positive number",
            config.tracking.service_radius_km
        ));
    }
    validate_range_f64(
        &mut errors,
        "tracking.viewport_padding",
        config.tracking.viewport_padding,
        0.0,
        1.0,
    );
    if let Some(center) = config.tracking.service_center {
        validate_range_f64(
            &mut errors,
            "tracking.service_center.latitude",
            center.latitude,
            -90.0,
            90.0,
        );
        validate_range_f64(
            &mut errors,
            "tracking.service_center.longitude",
            center.longitude,
            -180.0,
            180.0,
        );
    }

    // Requests
    validate_range(
        &mut errors,
        "requests.response_timeout_ms",
        config.requests.response_timeout_ms,
        100,
        60_000,
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_range(errors: &mut Vec<String>, name: &str, value: u64, min: u64, max: u64) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

fn validate_range_f64(errors: &mut Vec<String>, name: &str, value: f64, min: f64, max: f64) {
    // NaN fails both comparisons, so check it explicitly.
    if !value.is_finite() || value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}
