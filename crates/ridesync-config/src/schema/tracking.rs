//! Live position tracking configuration.

use serde::{Deserialize, Serialize};

/// A configured coordinate (kept separate from the client's geo types so
/// this crate stays free of runtime dependencies).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateConfig {
    pub latitude: f64,
    pub longitude: f64,
}

/// Position reconciliation and map behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Recenter suppression window after a user gesture.
    pub gesture_cooldown_ms: u64,
    /// Distance from `service_center` beyond which a location is out of range.
    pub service_radius_km: f64,
    pub service_center: Option<CoordinateConfig>,
    /// Fractional padding added around a recenter viewport (0.0-1.0).
    pub viewport_padding: f64,
    /// Shown when reverse geocoding fails.
    pub placeholder_address: String,
    /// Nominatim-style reverse geocoding endpoint, if any.
    pub geocoder_url: Option<String>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            gesture_cooldown_ms: 3000,
            service_radius_km: 10.0,
            service_center: None,
            viewport_padding: 0.2,
            placeholder_address: "Unknown location".into(),
            geocoder_url: None,
        }
    }
}
