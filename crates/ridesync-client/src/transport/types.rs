//! Configuration for the transport layer.

use std::time::Duration;

/// Settings for the ride event channel.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// WebSocket endpoint, e.g. `wss://rides.example.com/socket`.
    pub url: String,
    /// Header carrying the access token on the upgrade request.
    pub auth_header: String,
    pub connect_timeout: Duration,
    /// Outbound queue depth; emits beyond it are dropped.
    pub outbound_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000/socket".to_string(),
            auth_header: "access_token".to_string(),
            connect_timeout: Duration::from_secs(15),
            outbound_buffer: 64,
        }
    }
}

impl TransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Header value for `token`. An `Authorization` header gets the
    /// `Bearer` scheme; custom headers carry the raw token.
    pub(crate) fn auth_value(&self, token: &str) -> String {
        if self.auth_header.eq_ignore_ascii_case("authorization") {
            format!("Bearer {token}")
        } else {
            token.to_string()
        }
    }
}
