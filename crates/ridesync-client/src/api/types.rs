//! Request/response shapes and errors for the REST API.

use std::fmt;

use ridesync_common::Role;
use serde::{Deserialize, Serialize};

use crate::session::Place;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The backend rejected the credentials.
    #[error("unauthorized")]
    Unauthorized,

    #[error("not signed in")]
    NotSignedIn,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("token storage failed: {0}")]
    Storage(#[from] StoreError),
}

impl ApiError {
    /// Server-provided text suitable for an alert, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Http { message, .. } if !message.is_empty() => Some(message),
            _ => None,
        }
    }
}

#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("role", &self.role)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Body of a ride creation request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRide {
    pub pickup: Place,
    pub drop: Place,
    pub vehicle: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub ride_id: String,
    /// 1 to 5.
    pub rating: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}
