//! Position events from the shared connection.

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::info;

use super::geo::Coordinate;
use super::sample::SampleRejection;
use crate::protocol::{inbound, outbound};
use crate::transport::{ConnectionManager, Subscription};

/// Raw position payloads; validation happens in the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Location of the rider assigned to the current ride.
    RiderLocation(Value),
    /// Full set of available riders around the subscribed zone.
    Nearby(Value),
}

pub struct PositionFeed {
    subscription: Subscription,
}

impl PositionFeed {
    pub fn bind(connection: &ConnectionManager) -> (Self, mpsc::UnboundedReceiver<FeedEvent>) {
        let (subscription, rx) = Subscription::forward(
            connection,
            &[inbound::RIDER_LOCATION_UPDATE, inbound::NEARBY_RIDERS],
            |event, payload| match event {
                inbound::RIDER_LOCATION_UPDATE => Some(FeedEvent::RiderLocation(payload)),
                inbound::NEARBY_RIDERS => Some(FeedEvent::Nearby(payload)),
                _ => None,
            },
        );
        (Self { subscription }, rx)
    }

    /// Follow one rider's position.
    pub fn subscribe_rider(&self, rider_id: &str) {
        info!(rider_id, "Tracking rider location");
        self.subscription
            .connection()
            .emit(outbound::SUBSCRIBE_RIDER_LOCATION, json!(rider_id));
    }

    /// Receive the nearby broadcast for the zone around `center`.
    pub fn subscribe_zone(&self, center: Coordinate) -> Result<(), SampleRejection> {
        if !center.is_valid() {
            return Err(SampleRejection::OutOfRange(center));
        }
        info!(%center, "Subscribing to zone");
        self.subscription.connection().emit(
            outbound::SUBSCRIBE_ZONE,
            json!({ "latitude": center.latitude, "longitude": center.longitude }),
        );
        Ok(())
    }

    pub fn release(&mut self) {
        self.subscription.release();
    }
}
