//! Live Position Reconciler.
//!
//! Validates rider and nearby-rider positions, keeps one current sample
//! per entity, and recenters the map without fighting user gestures.

mod details;
mod duty;
mod feed;
mod geo;
mod reconciler;
mod sample;

pub use details::{lookup_driver_details, DriverDetails};
pub use duty::{offer_feed, DutyController, RideOffer};
pub use feed::{FeedEvent, PositionFeed};
pub use geo::{Coordinate, Distance, ServiceArea, Viewport, MIN_VIEWPORT_SPAN};
pub use reconciler::{
    GestureGate, MapSurface, PositionReconciler, RecenterOutcome, ReconcilerConfig,
};
pub use sample::{NearbyEntity, PositionSample, SampleRejection};
