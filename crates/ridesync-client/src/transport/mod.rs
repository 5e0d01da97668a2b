//! Connection Manager for the ride event channel.
//!
//! Owns the single WebSocket connection to the backend, attaches the
//! access token to the upgrade request, and exposes a small
//! publish/subscribe surface (`emit`, `on`, `off`) shared by every screen.
//! Changing the token tears the connection down and opens a new one; an
//! authentication rejection triggers one out-of-band token refresh.

mod connection;
mod manager;
mod registry;
mod subscription;
mod types;

#[cfg(test)]
mod tests;

pub use manager::ConnectionManager;
pub use registry::{EventHandler, HandlerId};
pub use subscription::Subscription;
pub use types::TransportConfig;
