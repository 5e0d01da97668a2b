pub mod errors;
pub mod id;
pub mod notices;
pub mod types;

pub use errors::{ConfigError, RideSyncError};
pub use id::{new_correlation_id, RideId};
pub use notices::{Notice, NoticeLevel};
pub use types::{Role, Route};

pub type Result<T> = std::result::Result<T, RideSyncError>;
