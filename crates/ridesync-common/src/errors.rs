use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RideSyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("tracking.service_radius_km".into());
        assert_eq!(
            err.to_string(),
            "config validation error: tracking.service_radius_km"
        );
    }

    #[test]
    fn ridesync_error_from_config() {
        let config_err = ConfigError::ParseError("bad toml".into());
        let err: RideSyncError = config_err.into();
        assert!(matches!(err, RideSyncError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn ridesync_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: RideSyncError = io_err.into();
        assert!(matches!(err, RideSyncError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn ridesync_error_other_variants() {
        let err = RideSyncError::Network("timeout".into());
        assert_eq!(err.to_string(), "network error: timeout");

        let err = RideSyncError::Auth("refresh token revoked".into());
        assert_eq!(err.to_string(), "auth error: refresh token revoked");

        let err = RideSyncError::Protocol("missing rideId".into());
        assert_eq!(err.to_string(), "protocol error: missing rideId");

        let err = RideSyncError::Storage("disk full".into());
        assert_eq!(err.to_string(), "storage error: disk full");

        let err = RideSyncError::Other("something went wrong".into());
        assert_eq!(err.to_string(), "something went wrong");
    }
}
