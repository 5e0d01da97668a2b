//! Configuration schema types for ridesync.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod network;
mod system;
mod tracking;

pub use network::*;
pub use system::*;
pub use tracking::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RideSyncConfig {
    pub connection: ConnectionConfig,
    pub api: ApiConfig,
    pub tracking: TrackingConfig,
    pub requests: RequestsConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}
