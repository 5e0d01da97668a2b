//! Ride session synchronization for the ride-hailing client.
//!
//! Three cooperating pieces share one authenticated event channel:
//! - [`transport`]: the Connection Manager (connect, emit, on/off, disconnect)
//! - [`session`]: the Ride Session Controller and its event binding
//! - [`tracking`]: the Live Position Reconciler, duty toggles and feeds
//!
//! Around them sit the REST boundary ([`api`]), persisted key-value state
//! ([`store`]), reverse geocoding ([`geocode`]) and a request/response
//! correlation helper ([`correlate`]).

pub mod api;
pub mod auth;
pub mod correlate;
pub mod geocode;
pub mod protocol;
pub mod session;
pub mod store;
pub mod tracking;
pub mod transport;

pub use api::{ApiClient, ApiError};
pub use auth::TokenRefresher;
pub use correlate::{CorrelationError, Correlator};
pub use geocode::{address_or_placeholder, Geocoder, NominatimGeocoder};
pub use protocol::{Envelope, ProtocolError};
pub use session::{
    ActionError, CommandSink, LiveRideSession, RideCommand, RideSessionController, SessionUi,
};
pub use store::{FileStore, KvStore, MemoryStore, StoreError, TokenStore};
pub use tracking::{Coordinate, PositionReconciler};
pub use transport::{ConnectionManager, TransportConfig};
