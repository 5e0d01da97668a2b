//! Reverse geocoding with a placeholder fallback.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::api::ApiError;
use crate::tracking::Coordinate;

/// Turns a coordinate into a human-readable address.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse(&self, coordinate: Coordinate) -> Result<String, ApiError>;
}

/// Client for a Nominatim-compatible `/reverse` endpoint.
pub struct NominatimGeocoder {
    http: reqwest::Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ridesync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse(&self, coordinate: Coordinate) -> Result<String, ApiError> {
        let response = self
            .http
            .get(format!("{}/reverse", self.base_url))
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", coordinate.latitude.to_string()),
                ("lon", coordinate.longitude.to_string()),
            ])
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: String::new(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        body.get("display_name")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::Parse("no display_name in response".into()))
    }
}

/// Address for `coordinate`, or `placeholder` when there is no geocoder,
/// the coordinate is invalid, or the lookup fails.
pub async fn address_or_placeholder(
    geocoder: Option<&dyn Geocoder>,
    coordinate: Coordinate,
    placeholder: &str,
) -> String {
    let Some(geocoder) = geocoder.filter(|_| coordinate.is_valid()) else {
        return placeholder.to_string();
    };
    match geocoder.reverse(coordinate).await {
        Ok(address) => address,
        Err(e) => {
            debug!(%coordinate, error = %e, "Reverse geocoding failed; using placeholder");
            placeholder.to_string()
        }
    }
}
