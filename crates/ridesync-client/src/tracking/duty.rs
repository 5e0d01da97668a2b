//! Rider availability, location publishing and incoming offers.

use std::collections::HashMap;
use std::sync::Arc;

use ridesync_common::RideId;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::geo::Coordinate;
use super::sample::SampleRejection;
use crate::protocol::{inbound, ProtocolError};
use crate::session::{CommandSink, Counterpart, Place, RideCommand};
use crate::transport::{ConnectionManager, Subscription};

/// A ride proposed to an on-duty rider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideOffer {
    #[serde(alias = "_id", alias = "id")]
    pub ride_id: RideId,
    #[serde(default)]
    pub pickup: Option<Place>,
    #[serde(default)]
    pub drop: Option<Place>,
    #[serde(default)]
    pub fare: Option<f64>,
    #[serde(default)]
    pub vehicle: Option<String>,
    #[serde(default)]
    pub customer: Option<Counterpart>,
}

/// Bind `rideOffer` and forward its payloads.
pub fn offer_feed(
    connection: &ConnectionManager,
) -> (Subscription, mpsc::UnboundedReceiver<Value>) {
    Subscription::forward(connection, &[inbound::RIDE_OFFER], |_, payload| Some(payload))
}

/// Duty toggles apply locally at once; the backend is not awaited.
pub struct DutyController {
    commands: Arc<dyn CommandSink>,
    on_duty: bool,
    last_published: Option<Coordinate>,
    offers: HashMap<RideId, RideOffer>,
}

impl DutyController {
    pub fn new(commands: Arc<dyn CommandSink>) -> Self {
        Self {
            commands,
            on_duty: false,
            last_published: None,
            offers: HashMap::new(),
        }
    }

    pub fn is_on_duty(&self) -> bool {
        self.on_duty
    }

    /// Returns `false` when already on duty.
    pub fn go_on_duty(&mut self) -> bool {
        if self.on_duty {
            return false;
        }
        info!("Going on duty");
        self.commands.send(RideCommand::GoOnDuty);
        self.on_duty = true;
        true
    }

    /// Pending offers are dropped. Returns `false` when already off duty.
    pub fn go_off_duty(&mut self) -> bool {
        if !self.on_duty {
            return false;
        }
        info!("Going off duty");
        self.commands.send(RideCommand::GoOffDuty);
        self.on_duty = false;
        self.offers.clear();
        true
    }

    /// Publish the rider's location. Sent only while on duty; returns
    /// whether it was sent.
    pub fn publish_location(
        &mut self,
        coordinate: Coordinate,
        heading: Option<f64>,
    ) -> Result<bool, SampleRejection> {
        if !coordinate.is_valid() {
            debug!(%coordinate, "Not publishing invalid location");
            return Err(SampleRejection::OutOfRange(coordinate));
        }
        if !self.on_duty {
            return Ok(false);
        }
        self.commands.send(RideCommand::UpdateLocation {
            coordinate,
            heading,
        });
        self.last_published = Some(coordinate);
        Ok(true)
    }

    pub fn last_published(&self) -> Option<Coordinate> {
        self.last_published
    }

    /// Keep an incoming offer, replacing any earlier one for the same
    /// ride. Offers received off duty are ignored.
    pub fn record_offer(&mut self, payload: &Value) -> Result<Option<RideId>, ProtocolError> {
        let offer: RideOffer = serde_json::from_value(payload.clone())?;
        if !self.on_duty {
            debug!(ride_id = %offer.ride_id, "Offer while off duty; ignoring");
            return Ok(None);
        }
        let ride_id = offer.ride_id.clone();
        info!(ride_id = %ride_id, "Ride offer received");
        self.offers.insert(ride_id.clone(), offer);
        Ok(Some(ride_id))
    }

    pub fn offers(&self) -> impl Iterator<Item = &RideOffer> {
        self.offers.values()
    }

    /// Remove and return an offer, e.g. once accepted.
    pub fn take_offer(&mut self, ride_id: &RideId) -> Option<RideOffer> {
        self.offers.remove(ride_id)
    }

    pub fn clear_offers(&mut self) {
        self.offers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Sink(Mutex<Vec<RideCommand>>);

    impl CommandSink for Sink {
        fn send(&self, command: RideCommand) {
            self.0.lock().unwrap().push(command);
        }
    }

    fn duty() -> (DutyController, Arc<Sink>) {
        let sink = Arc::new(Sink::default());
        (DutyController::new(sink.clone()), sink)
    }

    #[test]
    fn toggles_are_optimistic_and_deduplicated() {
        let (mut duty, sink) = duty();
        assert!(duty.go_on_duty());
        assert!(duty.is_on_duty());
        assert!(!duty.go_on_duty());
        assert!(duty.go_off_duty());
        assert!(!duty.go_off_duty());
        assert_eq!(
            *sink.0.lock().unwrap(),
            vec![RideCommand::GoOnDuty, RideCommand::GoOffDuty]
        );
    }

    #[test]
    fn location_only_published_on_duty() {
        let (mut duty, sink) = duty();
        let here = Coordinate::new(14.6, 120.9);
        assert_eq!(duty.publish_location(here, None), Ok(false));

        duty.go_on_duty();
        assert_eq!(duty.publish_location(here, Some(10.0)), Ok(true));
        assert!(duty
            .publish_location(Coordinate::new(0.0, 200.0), None)
            .is_err());
        assert_eq!(duty.last_published(), Some(here));
        assert_eq!(sink.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn offers_kept_per_ride_and_cleared_off_duty() {
        let (mut duty, _) = duty();
        let offer = json!({
            "rideId": "r1",
            "fare": 90.0,
            "pickup": { "lat": 14.6, "lng": 120.9 }
        });

        assert_eq!(duty.record_offer(&offer).unwrap(), None);
        duty.go_on_duty();
        assert_eq!(duty.record_offer(&offer).unwrap(), Some(RideId::from("r1")));
        duty.record_offer(&json!({ "_id": "r1", "fare": 95.0 })).unwrap();
        assert_eq!(duty.offers().count(), 1);
        assert_eq!(duty.offers().next().unwrap().fare, Some(95.0));
        assert!(duty.record_offer(&json!({ "fare": 1 })).is_err());

        duty.record_offer(&json!({ "id": "r2" })).unwrap();
        assert!(duty.take_offer(&RideId::from("r2")).is_some());
        duty.go_off_duty();
        assert_eq!(duty.offers().count(), 0);
    }
}
