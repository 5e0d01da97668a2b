//! User and lifecycle actions as explicit commands.
//!
//! Each command declares how its effect is confirmed: some are applied
//! locally right away, others wait for the backend to echo an event.

use std::sync::Arc;

use ridesync_common::RideId;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::state::RideStatus;
use crate::api::ApiClient;
use crate::protocol::{inbound, outbound, Envelope};
use crate::tracking::Coordinate;
use crate::transport::ConnectionManager;

/// How a command's effect becomes visible in local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Nothing changes locally until the named inbound event arrives.
    AwaitEvent(&'static str),
    /// Applied locally as soon as it is sent.
    Optimistic,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RideCommand {
    Subscribe {
        ride_id: RideId,
    },
    BeginSearch {
        ride_id: RideId,
    },
    Cancel {
        ride_id: RideId,
    },
    UpdateStatus {
        ride_id: RideId,
        status: RideStatus,
    },
    GoOnDuty,
    GoOffDuty,
    UpdateLocation {
        coordinate: Coordinate,
        heading: Option<f64>,
    },
}

impl RideCommand {
    pub fn confirmation(&self) -> Confirmation {
        match self {
            Self::Subscribe { .. } => Confirmation::AwaitEvent(inbound::RIDE_DATA),
            Self::BeginSearch { .. } => Confirmation::AwaitEvent(inbound::RIDE_UPDATE),
            Self::Cancel { .. } => Confirmation::AwaitEvent(inbound::RIDE_CANCELED),
            Self::UpdateStatus { .. }
            | Self::GoOnDuty
            | Self::GoOffDuty
            | Self::UpdateLocation { .. } => Confirmation::Optimistic,
        }
    }

    /// Socket form of the command. `None` for commands that go over REST.
    pub fn to_envelope(&self) -> Option<Envelope> {
        let (event, data) = match self {
            Self::Subscribe { ride_id } => (outbound::SUBSCRIBE_RIDE, json!(ride_id)),
            Self::BeginSearch { ride_id } => (outbound::SEARCH_RIDER, json!(ride_id)),
            Self::Cancel { ride_id } => (outbound::CANCEL_RIDE, json!(ride_id)),
            Self::UpdateStatus { .. } => return None,
            Self::GoOnDuty => (outbound::GO_ON_DUTY, Value::Null),
            Self::GoOffDuty => (outbound::GO_OFF_DUTY, Value::Null),
            Self::UpdateLocation {
                coordinate,
                heading,
            } => (
                outbound::UPDATE_LOCATION,
                json!({
                    "latitude": coordinate.latitude,
                    "longitude": coordinate.longitude,
                    "heading": heading,
                }),
            ),
        };
        Some(Envelope::new(event, data))
    }
}

/// A command the backend refused after it was sent.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFailure {
    pub command: RideCommand,
    /// Server-provided reason, if it sent one.
    pub message: Option<String>,
}

/// Destination for commands issued by controllers.
pub trait CommandSink: Send + Sync {
    fn send(&self, command: RideCommand);
}

/// Sends commands over the shared connection, and status changes
/// through the REST API.
pub struct SocketCommandSink {
    connection: ConnectionManager,
    api: Option<Arc<ApiClient>>,
    failures: Option<mpsc::UnboundedSender<CommandFailure>>,
}

impl SocketCommandSink {
    pub fn new(connection: ConnectionManager, api: Option<Arc<ApiClient>>) -> Self {
        Self {
            connection,
            api,
            failures: None,
        }
    }

    /// Report refused REST commands on the returned channel.
    pub fn with_failures(mut self) -> (Self, mpsc::UnboundedReceiver<CommandFailure>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.failures = Some(tx);
        (self, rx)
    }

    fn report(&self, command: RideCommand, message: Option<String>) {
        report(self.failures.as_ref(), command, message);
    }
}

fn report(
    failures: Option<&mpsc::UnboundedSender<CommandFailure>>,
    command: RideCommand,
    message: Option<String>,
) {
    if let Some(tx) = failures {
        let _ = tx.send(CommandFailure { command, message });
    }
}

impl CommandSink for SocketCommandSink {
    fn send(&self, command: RideCommand) {
        if let Some(envelope) = command.to_envelope() {
            self.connection.emit(&envelope.event, envelope.data);
            return;
        }

        let RideCommand::UpdateStatus { ride_id, status } = command else {
            return;
        };
        let Some(api) = self.api.clone() else {
            warn!(ride_id = %ride_id, %status, "No API client; status update not sent");
            self.report(RideCommand::UpdateStatus { ride_id, status }, None);
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(ride_id = %ride_id, %status, "No runtime; status update not sent");
            self.report(RideCommand::UpdateStatus { ride_id, status }, None);
            return;
        };
        let failures = self.failures.clone();
        runtime.spawn(async move {
            match api.update_ride_status(&ride_id, status).await {
                Ok(()) => debug!(ride_id = %ride_id, %status, "Ride status updated"),
                Err(e) => {
                    warn!(ride_id = %ride_id, %status, error = %e, "Ride status update failed");
                    let message = e.server_message().map(str::to_string);
                    report(
                        failures.as_ref(),
                        RideCommand::UpdateStatus { ride_id, status },
                        message,
                    );
                }
            }
        });
    }
}
