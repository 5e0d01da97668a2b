//! Typed ride-scoped inbound events.

use ridesync_common::RideId;
use serde_json::Value;

use super::state::{RideData, RideUpdate};
use crate::protocol::{inbound, server_message, ProtocolError};

/// Inbound events a ride session reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum RideEvent {
    /// Full replace.
    Snapshot(RideData),
    /// Field-by-field merge.
    Update(RideUpdate),
    Canceled {
        ride_id: Option<RideId>,
        message: Option<String>,
    },
    Error {
        message: Option<String>,
    },
}

impl RideEvent {
    /// Parse the payload of a ride-scoped event named `event`.
    pub fn from_wire(event: &str, payload: &Value) -> Result<Self, ProtocolError> {
        match event {
            inbound::RIDE_DATA => Ok(Self::Snapshot(serde_json::from_value(unwrap_ride(payload))?)),
            inbound::RIDE_UPDATE => {
                if !payload.is_object() {
                    return Err(ProtocolError::InvalidField {
                        field: "data",
                        reason: "expected an object".into(),
                    });
                }
                Ok(Self::Update(serde_json::from_value(unwrap_ride(payload))?))
            }
            inbound::RIDE_CANCELED => Ok(Self::Canceled {
                ride_id: ride_id_of(payload),
                message: server_message(payload),
            }),
            inbound::ERROR => Ok(Self::Error {
                message: server_message(payload),
            }),
            other => Err(ProtocolError::UnexpectedEvent(other.to_string())),
        }
    }
}

/// Some payloads wrap the ride as `{ "ride": { .. } }`.
fn unwrap_ride(payload: &Value) -> Value {
    match payload.get("ride") {
        Some(ride) if ride.is_object() => ride.clone(),
        _ => payload.clone(),
    }
}

fn ride_id_of(payload: &Value) -> Option<RideId> {
    let body = payload.get("ride").unwrap_or(payload);
    ["rideId", "_id", "id"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
        .map(RideId::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::state::RideStatus;
    use serde_json::json;

    #[test]
    fn snapshot_and_wrapped_snapshot() {
        let bare =
            RideEvent::from_wire("rideData", &json!({ "_id": "r1", "status": "START" })).unwrap();
        let wrapped =
            RideEvent::from_wire("rideData", &json!({ "ride": { "_id": "r1", "status": "START" } }))
                .unwrap();
        assert_eq!(bare, wrapped);
        match bare {
            RideEvent::Snapshot(data) => assert_eq!(data.status, RideStatus::Start),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn snapshot_without_status_is_rejected() {
        assert!(RideEvent::from_wire("rideData", &json!({ "_id": "r1" })).is_err());
    }

    #[test]
    fn update_must_be_an_object() {
        assert!(RideEvent::from_wire("rideUpdate", &json!("START")).is_err());
        let event = RideEvent::from_wire("rideUpdate", &json!({ "otp": "1111" })).unwrap();
        assert!(matches!(event, RideEvent::Update(u) if u.otp.as_deref() == Some("1111")));
    }

    #[test]
    fn cancel_and_error_carry_messages() {
        let canceled = RideEvent::from_wire(
            "rideCanceled",
            &json!({ "rideId": "r1", "message": "Customer canceled" }),
        )
        .unwrap();
        assert_eq!(
            canceled,
            RideEvent::Canceled {
                ride_id: Some(RideId::from("r1")),
                message: Some("Customer canceled".into()),
            }
        );

        let error = RideEvent::from_wire("error", &json!("Ride not found")).unwrap();
        assert_eq!(
            error,
            RideEvent::Error {
                message: Some("Ride not found".into())
            }
        );
    }

    #[test]
    fn unrelated_event_is_unexpected() {
        assert!(matches!(
            RideEvent::from_wire("nearbyriders", &json!([])),
            Err(ProtocolError::UnexpectedEvent(_))
        ));
    }
}
