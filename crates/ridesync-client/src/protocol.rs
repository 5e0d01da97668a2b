//! Wire protocol for the ride event channel.
//!
//! Every text frame in either direction is a JSON envelope
//! `{"event": <name>, "data": <payload>}`. Event names mirror what the
//! backend emits and listens for; payload shapes live next to the
//! components that consume them.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Events the client publishes.
pub mod outbound {
    pub const SUBSCRIBE_RIDE: &str = "subscribeRide";
    pub const SEARCH_RIDER: &str = "searchrider";
    pub const CANCEL_RIDE: &str = "cancelRide";
    pub const SUBSCRIBE_RIDER_LOCATION: &str = "subscribeToriderLocation";
    pub const SUBSCRIBE_ZONE: &str = "subscribeToZone";
    pub const GO_ON_DUTY: &str = "goOnDuty";
    pub const GO_OFF_DUTY: &str = "goOffDuty";
    pub const UPDATE_LOCATION: &str = "updateLocation";
    pub const GET_DRIVER_DETAILS: &str = "getDriverDetails";
}

/// Events the backend pushes.
pub mod inbound {
    pub const RIDE_DATA: &str = "rideData";
    pub const RIDE_UPDATE: &str = "rideUpdate";
    pub const RIDE_CANCELED: &str = "rideCanceled";
    pub const ERROR: &str = "error";
    pub const RIDER_LOCATION_UPDATE: &str = "riderLocationUpdate";
    pub const NEARBY_RIDERS: &str = "nearbyriders";
    pub const DRIVER_DETAILS_RESPONSE: &str = "driverDetailsResponse";
    pub const RIDE_OFFER: &str = "rideOffer";
}

/// Pseudo-events raised by the connection manager itself.
pub mod lifecycle {
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const CONNECT_ERROR: &str = "connect_error";
    /// Token refresh failed; the session is gone.
    pub const AUTH_EXPIRED: &str = "auth_expired";
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A single event frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An inbound payload that could not be turned into a typed event.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("unexpected event '{0}'")]
    UnexpectedEvent(String),

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Pull a human-readable message out of a server payload.
///
/// The backend sends either a bare string or an object with `message`.
pub fn server_message(payload: &serde_json::Value) -> Option<String> {
    match payload {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Object(map) => map
            .get("message")
            .and_then(|m| m.as_str())
            .filter(|m| !m.trim().is_empty())
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_wire_shape() {
        let env = Envelope::new(outbound::SUBSCRIBE_RIDE, json!("ride-1"));
        let text = serde_json::to_string(&env).unwrap();
        assert_eq!(text, r#"{"event":"subscribeRide","data":"ride-1"}"#);
    }

    #[test]
    fn envelope_without_data_defaults_to_null() {
        let env: Envelope = serde_json::from_str(r#"{"event":"rideCanceled"}"#).unwrap();
        assert_eq!(env.event, "rideCanceled");
        assert!(env.data.is_null());
    }

    #[test]
    fn server_message_from_string_or_object() {
        assert_eq!(
            server_message(&json!("Ride not found")).as_deref(),
            Some("Ride not found")
        );
        assert_eq!(
            server_message(&json!({"message": "Rider unavailable"})).as_deref(),
            Some("Rider unavailable")
        );
        assert_eq!(server_message(&json!({"message": ""})), None);
        assert_eq!(server_message(&json!(42)), None);
    }
}
