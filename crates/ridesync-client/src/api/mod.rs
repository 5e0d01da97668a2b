//! REST boundary: auth, rides and ratings.

mod client;
mod types;

#[cfg(test)]
mod tests;

pub use client::ApiClient;
pub use types::{ApiError, AuthTokens, LoginRequest, NewRide, Rating};
