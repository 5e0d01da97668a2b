//! Detail lookup for a nearby rider, with a local fallback.

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::geo::Coordinate;
use super::sample::NearbyEntity;
use crate::correlate::Correlator;
use crate::protocol::{inbound, outbound};

#[derive(Debug, Clone, PartialEq)]
pub struct DriverDetails {
    pub id: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub vehicle: Option<String>,
    pub rating: Option<f64>,
    pub position: Option<Coordinate>,
    /// Built locally because the backend did not answer in time.
    pub degraded: bool,
}

impl DriverDetails {
    /// What the map already knows about `entity`.
    pub fn degraded(entity: &NearbyEntity) -> Self {
        Self {
            id: entity.id.clone(),
            name: None,
            phone: None,
            vehicle: entity.vehicle.clone(),
            rating: None,
            position: Some(entity.position.coordinate),
            degraded: true,
        }
    }

    fn from_response(entity: &NearbyEntity, payload: &Value) -> Self {
        let body = payload
            .get("driver")
            .filter(|v| v.is_object())
            .unwrap_or(payload);
        let text = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            id: entity.id.clone(),
            name: text("name"),
            phone: text("phone"),
            vehicle: text("vehicle")
                .or_else(|| text("vehicleType"))
                .or_else(|| entity.vehicle.clone()),
            rating: body.get("rating").and_then(Value::as_f64),
            position: Some(entity.position.coordinate),
            degraded: false,
        }
    }
}

fn response_id(payload: &Value) -> Option<String> {
    let body = payload.get("driver").unwrap_or(payload);
    ["driverId", "riderId", "id", "_id"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Ask the backend for `entity`'s details. Falls back to
/// [`DriverDetails::degraded`] on timeout, cancellation or a closed
/// listener; never fails.
pub async fn lookup_driver_details(
    correlator: &Correlator,
    entity: &NearbyEntity,
    cancel: &CancellationToken,
) -> DriverDetails {
    let wanted = entity.id.clone();
    let result = correlator
        .request(
            outbound::GET_DRIVER_DETAILS,
            json!({ "driverId": entity.id }),
            inbound::DRIVER_DETAILS_RESPONSE,
            move |payload| response_id(payload).map_or(true, |id| id == wanted),
            cancel,
        )
        .await;

    match result {
        Ok(payload) => {
            debug!(driver = %entity.id, "Driver details received");
            DriverDetails::from_response(entity, &payload)
        }
        Err(e) => {
            info!(driver = %entity.id, reason = %e, "Using local driver details");
            DriverDetails::degraded(entity)
        }
    }
}
