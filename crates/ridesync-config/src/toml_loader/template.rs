//! Commented default config written on first run.

pub(crate) fn default_config_toml() -> &'static str {
    r##"# Ridesync Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[connection]
# url = "ws://localhost:3000/socket"
# auth_header = "access_token"
# connect_timeout_secs = 15     # 1-120
# outbound_buffer = 64          # 1-4096

[api]
# base_url = "http://localhost:3000"
# request_timeout_secs = 30     # 1-300

[tracking]
# gesture_cooldown_ms = 3000    # 0-60000
# service_radius_km = 10.0
# service_center = { latitude = 14.5995, longitude = 120.9842 }
# viewport_padding = 0.2        # 0.0-1.0
# placeholder_address = "Unknown location"
# geocoder_url = "https://nominatim.openstreetmap.org"

[requests]
# response_timeout_ms = 3000    # 100-60000

[storage]
# directory = "/path/to/state"

[logging]
# level = "info"                # trace, debug, info, warn, error
"##
}
