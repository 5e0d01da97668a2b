//! Backend connection, REST, and request/response settings.

use serde::{Deserialize, Serialize};

/// Persistent event channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// WebSocket endpoint of the ride event server.
    pub url: String,
    /// Header that carries the access token on the upgrade request.
    pub auth_header: String,
    pub connect_timeout_secs: u64,
    /// Outbound queue depth; emits beyond it are dropped.
    pub outbound_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000/socket".into(),
            auth_header: "access_token".into(),
            connect_timeout_secs: 15,
            outbound_buffer: 64,
        }
    }
}

/// REST backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            request_timeout_secs: 30,
        }
    }
}

/// Request/response correlation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestsConfig {
    /// How long to wait for a matching response event before falling back.
    pub response_timeout_ms: u64,
}

impl Default for RequestsConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 3000,
        }
    }
}
