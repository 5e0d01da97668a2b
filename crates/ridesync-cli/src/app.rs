//! Services shared by every command, built once from the config.

use std::sync::Arc;
use std::time::Duration;

use ridesync_client::protocol::{lifecycle, server_message};
use ridesync_client::store::{APP_NAMESPACE, TOKENS_NAMESPACE};
use ridesync_client::tracking::{Distance, ReconcilerConfig, ServiceArea};
use ridesync_client::transport::Subscription;
use ridesync_client::{
    ApiClient, ApiError, ConnectionManager, Coordinate, Correlator, FileStore, Geocoder, KvStore,
    NominatimGeocoder, StoreError, TokenStore, TransportConfig,
};
use ridesync_common::{Result, RideSyncError};
use ridesync_config::RideSyncConfig;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Key in the app namespace holding the ride last followed.
pub const LAST_RIDE_KEY: &str = "lastRideId";
/// Key in the app namespace holding the role used at sign-in.
pub const ROLE_KEY: &str = "role";

const RETRY_POLL: Duration = Duration::from_millis(100);

pub struct Services {
    pub config: RideSyncConfig,
    pub api: Arc<ApiClient>,
    pub app_state: Arc<dyn KvStore>,
    pub connection: ConnectionManager,
}

impl Services {
    pub fn build(config: RideSyncConfig) -> Result<Self> {
        let dir = FileStore::resolve_dir(config.storage.directory.as_deref()).map_err(store_error)?;
        let tokens = FileStore::open(&dir, TOKENS_NAMESPACE).map_err(store_error)?;
        let app_state = FileStore::open(&dir, APP_NAMESPACE).map_err(store_error)?;
        info!(dir = %dir.display(), "Opened client state");

        let api = Arc::new(
            ApiClient::new(
                config.api.base_url.clone(),
                Duration::from_secs(config.api.request_timeout_secs),
                TokenStore::new(Arc::new(tokens)),
            )
            .map_err(api_error)?,
        );

        let connection = ConnectionManager::new(TransportConfig {
            url: config.connection.url.clone(),
            auth_header: config.connection.auth_header.clone(),
            connect_timeout: Duration::from_secs(config.connection.connect_timeout_secs),
            outbound_buffer: config.connection.outbound_buffer,
        });
        connection.set_token_refresher(api.clone());

        Ok(Self {
            config,
            api,
            app_state: Arc::new(app_state),
            connection,
        })
    }

    /// Connect with the stored access token and wait for the channel.
    /// A no-op when already connected.
    pub async fn open_channel(&self) -> Result<()> {
        if self.connection.is_connected() {
            return Ok(());
        }
        let token = self
            .api
            .tokens()
            .access_token()
            .map_err(store_error)?
            .ok_or_else(|| {
                RideSyncError::Auth("not signed in; run `ridesync login` first".into())
            })?;

        self.connection.connect(token);
        // Auth rejections reconnect with a refreshed token; follow whichever
        // attempt is current until the deadline.
        let deadline =
            Instant::now() + Duration::from_secs(self.config.connection.connect_timeout_secs);
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            if self.connection.wait_connected(remaining).await {
                return Ok(());
            }
            tokio::time::sleep(RETRY_POLL.min(remaining)).await;
        }
        self.connection.disconnect();
        Err(RideSyncError::Network(format!(
            "could not reach {}",
            self.config.connection.url
        )))
    }

    pub fn correlator(&self) -> Correlator {
        Correlator::new(
            self.connection.clone(),
            Duration::from_millis(self.config.requests.response_timeout_ms),
        )
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        let tracking = &self.config.tracking;
        ReconcilerConfig {
            gesture_cooldown: Duration::from_millis(tracking.gesture_cooldown_ms),
            viewport_padding: tracking.viewport_padding,
            service_area: tracking.service_center.as_ref().map(|center| {
                ServiceArea::new(
                    Coordinate::new(center.latitude, center.longitude),
                    Distance::from_kilometers(tracking.service_radius_km),
                )
            }),
        }
    }

    pub fn geocoder(&self) -> Option<Arc<dyn Geocoder>> {
        let url = self.config.tracking.geocoder_url.as_deref()?;
        let timeout = Duration::from_secs(self.config.api.request_timeout_secs);
        match NominatimGeocoder::new(url, timeout) {
            Ok(geocoder) => Some(Arc::new(geocoder)),
            Err(e) => {
                warn!(error = %e, "Reverse geocoding disabled");
                None
            }
        }
    }

    pub fn remember(&self, key: &str, value: Option<&str>) {
        let result = match value {
            Some(value) => self.app_state.set(key, value),
            None => self.app_state.delete(key),
        };
        if let Err(e) = result {
            warn!(key, error = %e, "Failed to update client state");
        }
    }

    pub fn recall(&self, key: &str) -> Option<String> {
        self.app_state.get(key).unwrap_or_else(|e| {
            warn!(key, error = %e, "Failed to read client state");
            None
        })
    }

    pub fn shutdown(&self) {
        self.connection.disconnect();
    }
}

// ---------------------------------------------------------------------------
// Channel lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle pseudo-events a running flow reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    ConnectError(String),
    /// The session could not be renewed; the user must sign in again.
    AuthExpired(String),
}

pub fn watch_channel(
    connection: &ConnectionManager,
) -> (Subscription, mpsc::UnboundedReceiver<ChannelEvent>) {
    Subscription::forward(
        connection,
        &[
            lifecycle::CONNECT,
            lifecycle::DISCONNECT,
            lifecycle::CONNECT_ERROR,
            lifecycle::AUTH_EXPIRED,
        ],
        |event, payload| {
            let message = || server_message(&payload).unwrap_or_else(|| "no details".to_string());
            match event {
                lifecycle::CONNECT => Some(ChannelEvent::Connected),
                lifecycle::DISCONNECT => Some(ChannelEvent::Disconnected),
                lifecycle::CONNECT_ERROR => Some(ChannelEvent::ConnectError(message())),
                lifecycle::AUTH_EXPIRED => Some(ChannelEvent::AuthExpired(message())),
                _ => None,
            }
        },
    )
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

pub fn api_error(e: ApiError) -> RideSyncError {
    match e {
        e @ (ApiError::Unauthorized | ApiError::NotSignedIn) => RideSyncError::Auth(e.to_string()),
        ApiError::Storage(e) => store_error(e),
        ApiError::InvalidRequest(message) => RideSyncError::Other(message),
        ApiError::Parse(message) => RideSyncError::Protocol(message),
        e => RideSyncError::Network(e.to_string()),
    }
}

pub fn store_error(e: StoreError) -> RideSyncError {
    RideSyncError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridesync_config::schema::CoordinateConfig;

    fn services(dir: &std::path::Path) -> Services {
        let mut config = RideSyncConfig::default();
        config.storage.directory = Some(dir.to_path_buf());
        Services::build(config).unwrap()
    }

    #[test]
    fn api_errors_map_to_top_level_kinds() {
        assert!(matches!(api_error(ApiError::Unauthorized), RideSyncError::Auth(_)));
        assert!(matches!(
            api_error(ApiError::Http {
                status: 500,
                message: "boom".into()
            }),
            RideSyncError::Network(_)
        ));
        assert!(matches!(
            api_error(ApiError::Parse("bad json".into())),
            RideSyncError::Protocol(_)
        ));
    }

    #[test]
    fn state_is_persisted_under_the_storage_directory() {
        let dir = tempfile::tempdir().unwrap();
        let first = services(dir.path());
        first.remember(LAST_RIDE_KEY, Some("r1"));

        let second = services(dir.path());
        assert_eq!(second.recall(LAST_RIDE_KEY).as_deref(), Some("r1"));
        second.remember(LAST_RIDE_KEY, None);
        assert_eq!(second.recall(LAST_RIDE_KEY), None);
    }

    #[test]
    fn service_area_only_with_a_center() {
        let dir = tempfile::tempdir().unwrap();
        let mut services = services(dir.path());
        assert!(services.reconciler_config().service_area.is_none());

        services.config.tracking.service_center = Some(CoordinateConfig {
            latitude: 14.6,
            longitude: 120.9,
        });
        services.config.tracking.service_radius_km = 5.0;
        let area = services.reconciler_config().service_area.unwrap();
        assert_eq!(area.radius.as_kilometers(), 5.0);
    }

    #[tokio::test]
    async fn opening_the_channel_requires_a_token() {
        let dir = tempfile::tempdir().unwrap();
        let services = services(dir.path());
        let err = services.open_channel().await.unwrap_err();
        assert!(matches!(err, RideSyncError::Auth(_)));
    }

    #[test]
    fn geocoder_only_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut services = services(dir.path());
        assert!(services.geocoder().is_none());
        services.config.tracking.geocoder_url = Some("http://127.0.0.1:9".into());
        assert!(services.geocoder().is_some());
    }
}
