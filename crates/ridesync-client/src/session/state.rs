//! Ride session data and lifecycle phases.

use std::fmt;

use ridesync_common::RideId;
use serde::{Deserialize, Deserializer, Serialize};

/// Server-side ride lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    SearchingForRider,
    Start,
    Arrived,
    Completed,
    Canceled,
    Error,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SearchingForRider => "SEARCHING_FOR_RIDER",
            Self::Start => "START",
            Self::Arrived => "ARRIVED",
            Self::Completed => "COMPLETED",
            Self::Canceled => "CANCELED",
            Self::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Canceled | Self::Error)
    }

    /// The status a rider advances from to reach this one.
    pub fn previous(&self) -> Option<RideStatus> {
        match self {
            Self::Arrived => Some(Self::Start),
            Self::Completed => Some(Self::Arrived),
            _ => None,
        }
    }

    /// Statuses in which the customer may still cancel.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::SearchingForRider | Self::Start | Self::Arrived)
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pickup or drop location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lng", alias = "lon")]
    pub longitude: f64,
    #[serde(default)]
    pub address: Option<String>,
}

/// Public profile of the other party on a ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// The backend sends either a bare id or a populated profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Counterpart {
    Id(String),
    Profile(Profile),
}

impl Counterpart {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Id(id) => Some(id),
            Self::Profile(profile) => profile.id.as_deref(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Id(_) => None,
            Self::Profile(profile) => profile.name.as_deref(),
        }
    }
}

/// OTPs arrive as strings or bare numbers.
fn otp_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Full ride snapshot, as carried by `rideData`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideData {
    #[serde(alias = "_id", alias = "rideId")]
    pub id: RideId,
    pub status: RideStatus,
    #[serde(default)]
    pub pickup: Option<Place>,
    #[serde(default)]
    pub drop: Option<Place>,
    #[serde(default)]
    pub fare: Option<f64>,
    #[serde(default, deserialize_with = "otp_string")]
    pub otp: Option<String>,
    #[serde(default)]
    pub customer: Option<Counterpart>,
    #[serde(default)]
    pub rider: Option<Counterpart>,
    #[serde(default)]
    pub vehicle: Option<String>,
}

/// Partial ride change, as carried by `rideUpdate`. Absent fields leave
/// the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideUpdate {
    #[serde(default, alias = "_id", alias = "rideId")]
    pub id: Option<RideId>,
    #[serde(default)]
    pub status: Option<RideStatus>,
    #[serde(default)]
    pub pickup: Option<Place>,
    #[serde(default)]
    pub drop: Option<Place>,
    #[serde(default)]
    pub fare: Option<f64>,
    #[serde(default, deserialize_with = "otp_string")]
    pub otp: Option<String>,
    #[serde(default)]
    pub customer: Option<Counterpart>,
    #[serde(default)]
    pub rider: Option<Counterpart>,
    #[serde(default)]
    pub vehicle: Option<String>,
}

impl RideUpdate {
    /// Merge into `ride` field by field. Applying the same update twice
    /// leaves the same result as applying it once.
    pub fn apply(&self, ride: &mut RideData) {
        if let Some(status) = self.status {
            ride.status = status;
        }
        merge(&mut ride.pickup, &self.pickup);
        merge(&mut ride.drop, &self.drop);
        merge(&mut ride.fare, &self.fare);
        merge(&mut ride.otp, &self.otp);
        merge(&mut ride.customer, &self.customer);
        merge(&mut ride.rider, &self.rider);
        merge(&mut ride.vehicle, &self.vehicle);
    }
}

fn merge<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
    if let Some(value) = incoming {
        *slot = Some(value.clone());
    }
}

/// Why a session stopped accepting events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    Canceled,
    Error,
    Completed,
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Mounted, nothing requested yet (or no ride id to request).
    Unbound,
    /// Subscribed, waiting for the first snapshot.
    Syncing,
    Active,
    Terminated(TerminalReason),
}

impl SessionPhase {
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated(_))
    }
}
