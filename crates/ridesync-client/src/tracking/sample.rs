//! Position samples and nearby entities as received from the backend.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::geo::Coordinate;

/// Why a sample was not stored.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SampleRejection {
    #[error("sample has no entity id")]
    MissingId,

    #[error("'{0}' is missing or not a number")]
    NotNumeric(&'static str),

    #[error("coordinate out of range: {0}")]
    OutOfRange(Coordinate),

    #[error("sample is older than the stored position")]
    Stale,
}

/// One location report for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSample {
    pub entity_id: String,
    pub coordinate: Coordinate,
    /// Bearing in degrees.
    pub heading: Option<f64>,
    /// Server timestamp, when the backend provides one.
    pub recorded_at: Option<DateTime<Utc>>,
}

impl PositionSample {
    pub fn new(entity_id: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            entity_id: entity_id.into(),
            coordinate,
            heading: None,
            recorded_at: None,
        }
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    pub fn with_recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = Some(recorded_at);
        self
    }

    pub fn validate(&self) -> Result<(), SampleRejection> {
        if self.entity_id.is_empty() {
            return Err(SampleRejection::MissingId);
        }
        if !self.coordinate.is_valid() {
            return Err(SampleRejection::OutOfRange(self.coordinate));
        }
        Ok(())
    }

    /// True only when both samples are timestamped and `self` is older.
    pub fn is_older_than(&self, other: &Self) -> bool {
        matches!((self.recorded_at, other.recorded_at), (Some(mine), Some(theirs)) if mine < theirs)
    }

    /// Parse and validate a location payload. Coordinates may sit at the
    /// top level or under `location`; `default_id` names the entity when
    /// the payload does not.
    pub fn from_wire(payload: &Value, default_id: Option<&str>) -> Result<Self, SampleRejection> {
        let body = payload
            .get("location")
            .filter(|v| v.is_object())
            .unwrap_or(payload);

        let latitude =
            number(body, &["latitude", "lat"]).ok_or(SampleRejection::NotNumeric("latitude"))?;
        let longitude = number(body, &["longitude", "lng", "lon"])
            .ok_or(SampleRejection::NotNumeric("longitude"))?;
        let entity_id = id(payload, &["riderId", "driverId", "id", "_id"])
            .or_else(|| default_id.map(str::to_string))
            .ok_or(SampleRejection::MissingId)?;

        let sample = Self {
            entity_id,
            coordinate: Coordinate::new(latitude, longitude),
            heading: number(payload, &["heading", "bearing"])
                .or_else(|| number(body, &["heading"])),
            recorded_at: timestamp(payload, &["recordedAt", "timestamp", "updatedAt"]),
        };
        sample.validate()?;
        Ok(sample)
    }
}

/// Another participant visible on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyEntity {
    pub id: String,
    pub position: PositionSample,
    /// Display category, e.g. `bike` or `cab`.
    pub vehicle: Option<String>,
}

impl NearbyEntity {
    pub fn new(position: PositionSample, vehicle: Option<String>) -> Self {
        Self {
            id: position.entity_id.clone(),
            position,
            vehicle,
        }
    }

    pub fn from_wire(payload: &Value) -> Result<Self, SampleRejection> {
        let position = PositionSample::from_wire(payload, None)?;
        let vehicle = ["vehicle", "vehicleType"]
            .iter()
            .find_map(|key| payload.get(key).and_then(Value::as_str))
            .map(str::to_string);
        Ok(Self::new(position, vehicle))
    }
}

/// First present key wins; a present non-number is not skipped.
fn number(body: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|key| body.get(key))
        .and_then(Value::as_f64)
}

fn id(body: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match body.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// RFC 3339 strings or epoch milliseconds.
fn timestamp(body: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    match keys.iter().find_map(|key| body.get(key))? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}
