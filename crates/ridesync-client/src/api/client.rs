//! HTTP client for the ride backend.

use std::time::Duration;

use async_trait::async_trait;
use ridesync_common::RideId;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::types::{ApiError, AuthTokens, LoginRequest, NewRide, Rating};
use crate::auth::TokenRefresher;
use crate::protocol::server_message;
use crate::session::{RideData, RideStatus};
use crate::store::TokenStore;

/// REST client. Authenticated calls carry the stored access token.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenStore,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        tokens: TokenStore,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn access_token(&self) -> Result<String, ApiError> {
        self.tokens.access_token()?.ok_or(ApiError::NotSignedIn)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|body| server_message(&body))
                .unwrap_or_else(|| text.chars().take(200).collect());
            return Err(ApiError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Parse(e.to_string()))
    }

    /// Send with the stored access token. A 401 triggers one refresh and
    /// one retry; a failed refresh surfaces as `Unauthorized`.
    async fn send_authorized(&self, request: reqwest::RequestBuilder) -> Result<Value, ApiError> {
        let token = self.access_token()?;
        let retry = request.try_clone();
        match self.send(request.bearer_auth(token)).await {
            Err(ApiError::Unauthorized) => {
                let Some(retry) = retry else {
                    return Err(ApiError::Unauthorized);
                };
                debug!("Access token rejected; refreshing");
                let token = match self.refresh_access_token().await {
                    Ok(token) => token,
                    Err(ApiError::Storage(e)) => return Err(ApiError::Storage(e)),
                    Err(_) => return Err(ApiError::Unauthorized),
                };
                self.send(retry.bearer_auth(token)).await
            }
            other => other,
        }
    }

    // -------------------------------------------------------------------------
    // Auth
    // -------------------------------------------------------------------------

    /// Sign in and store the returned tokens.
    pub async fn login(&self, request: &LoginRequest) -> Result<AuthTokens, ApiError> {
        debug!(email = %request.email, role = request.role.as_str(), "Signing in");
        let body = self
            .send(self.http.post(self.url("/auth/signin")).json(request))
            .await?;
        let tokens: AuthTokens = parse(unwrap_field(body, &["data"]))?;
        self.tokens
            .save(&tokens.access_token, tokens.refresh_token.as_deref())?;
        info!("Signed in");
        Ok(tokens)
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// Any failure clears the stored tokens; the user has to sign in again.
    pub async fn refresh_access_token(&self) -> Result<String, ApiError> {
        let Some(refresh) = self.tokens.refresh_token()? else {
            return Err(ApiError::NotSignedIn);
        };

        let result = async {
            let body = self
                .send(
                    self.http
                        .post(self.url("/auth/refresh-token"))
                        .json(&json!({ "refreshToken": refresh })),
                )
                .await?;
            let tokens: AuthTokens = parse(unwrap_field(body, &["data"]))?;
            self.tokens
                .save(&tokens.access_token, tokens.refresh_token.as_deref())?;
            Ok::<_, ApiError>(tokens.access_token)
        }
        .await;

        match result {
            Ok(access) => {
                info!("Access token refreshed");
                Ok(access)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed; clearing session");
                if let Err(clear) = self.tokens.clear() {
                    warn!(error = %clear, "Failed to clear tokens");
                }
                Err(e)
            }
        }
    }

    /// Tell the backend, then forget the tokens whatever it answered.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = match self.access_token() {
            Ok(token) => self
                .send(self.http.post(self.url("/auth/logout")).bearer_auth(token))
                .await
                .map(|_| ()),
            Err(ApiError::NotSignedIn) => Ok(()),
            Err(e) => Err(e),
        };
        self.tokens.clear()?;
        info!("Signed out");
        result
    }

    // -------------------------------------------------------------------------
    // Rides
    // -------------------------------------------------------------------------

    pub async fn create_ride(&self, ride: &NewRide) -> Result<RideData, ApiError> {
        let body = self
            .send_authorized(self.http.post(self.url("/ride/create")).json(ride))
            .await?;
        parse(unwrap_field(body, &["ride", "data"]))
    }

    /// The signed-in user's rides, newest first as the backend returns them.
    pub async fn list_rides(&self) -> Result<Vec<RideData>, ApiError> {
        let body = self
            .send_authorized(self.http.get(self.url("/ride/rides")))
            .await?;
        let list = unwrap_field(body, &["rides", "data"]);
        let Value::Array(items) = list else {
            return Err(ApiError::Parse("expected a list of rides".into()));
        };
        // One unreadable entry should not hide the rest.
        Ok(items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(ride) => Some(ride),
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable ride");
                    None
                }
            })
            .collect())
    }

    /// The ride to resume, if any is still in progress.
    pub async fn in_progress_ride(&self) -> Result<Option<RideData>, ApiError> {
        let rides = self.list_rides().await?;
        Ok(rides.into_iter().find(|ride| !ride.status.is_terminal()))
    }

    pub async fn update_ride_status(
        &self,
        ride_id: &RideId,
        status: RideStatus,
    ) -> Result<(), ApiError> {
        self.send_authorized(
            self.http
                .patch(self.url(&format!("/ride/update/{ride_id}")))
                .json(&json!({ "status": status })),
        )
        .await
        .map(|_| ())
    }

    pub async fn submit_rating(&self, rating: &Rating) -> Result<(), ApiError> {
        if !(1..=5).contains(&rating.rating) {
            return Err(ApiError::InvalidRequest(format!(
                "rating must be between 1 and 5, got {}",
                rating.rating
            )));
        }
        self.send_authorized(self.http.post(self.url("/rating/create")).json(rating))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl TokenRefresher for ApiClient {
    async fn refresh(&self) -> Result<String, ApiError> {
        self.refresh_access_token().await
    }
}

/// Responses are sometimes wrapped as `{ "<key>": .. }`.
fn unwrap_field(body: Value, keys: &[&str]) -> Value {
    for key in keys {
        if let Some(inner) = body.get(key) {
            if inner.is_object() || inner.is_array() {
                return inner.clone();
            }
        }
    }
    body
}

fn parse<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::Parse(e.to_string()))
}
