//! Token refresh seam between the connection and the auth service.

use async_trait::async_trait;

use crate::api::ApiError;

/// Produces a fresh access token after the current one was rejected.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self) -> Result<String, ApiError>;
}
