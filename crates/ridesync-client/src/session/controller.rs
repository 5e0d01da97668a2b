//! Per-screen ride session state machine.

use std::sync::Arc;

use ridesync_common::{Notice, RideId, Role, Route};
use tracing::{debug, info, warn};

use super::commands::{CommandFailure, CommandSink, RideCommand};
use super::events::RideEvent;
use super::state::{RideData, RideStatus, SessionPhase, TerminalReason};

/// Presentation boundary the controller drives.
pub trait SessionUi: Send + Sync {
    fn notify(&self, notice: Notice);
    fn navigate(&self, route: Route);
}

/// A user action the current session state does not permit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("the entered code does not match the ride OTP")]
    OtpMismatch,

    #[error("cannot {action} while the ride is {}", status_label(.status))]
    NotAllowed {
        action: &'static str,
        status: Option<RideStatus>,
    },

    #[error("action not available to a {0}")]
    WrongRole(&'static str),

    #[error("no ride is bound to this session")]
    NoRide,
}

fn status_label(status: &Option<RideStatus>) -> &'static str {
    status.as_ref().map(RideStatus::as_str).unwrap_or("not loaded")
}

/// Folds a ride's inbound events into local state and turns terminal
/// conditions into notices and navigation.
///
/// Bound to one ride id for its whole life.
pub struct RideSessionController {
    role: Role,
    ride_id: Option<RideId>,
    phase: SessionPhase,
    ride: Option<RideData>,
    /// Status seen on the previous event, for edge-triggered side effects.
    last_status: Option<RideStatus>,
    commands: Arc<dyn CommandSink>,
    ui: Arc<dyn SessionUi>,
}

impl RideSessionController {
    pub fn new(
        role: Role,
        ride_id: Option<RideId>,
        commands: Arc<dyn CommandSink>,
        ui: Arc<dyn SessionUi>,
    ) -> Self {
        Self {
            role,
            ride_id,
            phase: SessionPhase::Unbound,
            ride: None,
            last_status: None,
            commands,
            ui,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn ride_id(&self) -> Option<&RideId> {
        self.ride_id.as_ref()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn ride(&self) -> Option<&RideData> {
        self.ride.as_ref()
    }

    pub fn status(&self) -> Option<RideStatus> {
        self.ride.as_ref().map(|r| r.status)
    }

    /// Request the ride's events. Without a ride id nothing is requested
    /// and the session stays unbound.
    pub fn mount(&mut self) {
        if self.phase != SessionPhase::Unbound {
            return;
        }
        let Some(ride_id) = self.ride_id.clone() else {
            info!(role = self.role.as_str(), "No ride id; showing empty ride screen");
            return;
        };
        info!(ride_id = %ride_id, role = self.role.as_str(), "Subscribing to ride");
        self.commands.send(RideCommand::Subscribe { ride_id });
        self.phase = SessionPhase::Syncing;
    }

    /// Fold one inbound event into the session.
    pub fn handle(&mut self, event: RideEvent) {
        if self.phase.is_terminated() {
            debug!(phase = ?self.phase, "Session terminated; ignoring event");
            return;
        }
        let Some(bound) = self.ride_id.clone() else {
            debug!("Unbound session; ignoring event");
            return;
        };

        match event {
            RideEvent::Snapshot(data) => {
                if data.id != bound {
                    warn!(
                        ride_id = %bound,
                        other = %data.id,
                        "Snapshot for another ride; ignoring"
                    );
                    return;
                }
                let status = data.status;
                debug!(ride_id = %bound, %status, "Ride snapshot");
                self.ride = Some(data);
                self.phase = SessionPhase::Active;
                self.on_status(status);
            }
            RideEvent::Update(update) => {
                if self.phase != SessionPhase::Active {
                    debug!(ride_id = %bound, "Update before first snapshot; dropping");
                    return;
                }
                if let Some(other) = update.id.as_ref().filter(|id| **id != bound) {
                    warn!(ride_id = %bound, other = %other, "Update for another ride; ignoring");
                    return;
                }
                let Some(ride) = self.ride.as_mut() else {
                    return;
                };
                update.apply(ride);
                let status = ride.status;
                debug!(ride_id = %bound, %status, "Ride updated");
                self.on_status(status);
            }
            RideEvent::Canceled { ride_id, message } => {
                if let Some(other) = ride_id.filter(|id| *id != bound) {
                    warn!(
                        ride_id = %bound,
                        other = %other,
                        "Cancellation for another ride; ignoring"
                    );
                    return;
                }
                self.terminate(TerminalReason::Canceled, message);
            }
            RideEvent::Error { message } => self.terminate(TerminalReason::Error, message),
        }
    }

    fn on_status(&mut self, status: RideStatus) {
        let previous = self.last_status.replace(status);
        let entered = previous != Some(status);

        match status {
            RideStatus::SearchingForRider if entered && self.role == Role::Customer => {
                if let Some(ride_id) = self.ride_id.clone() {
                    info!(ride_id = %ride_id, "Searching for a rider");
                    self.commands.send(RideCommand::BeginSearch { ride_id });
                }
            }
            RideStatus::Completed => self.terminate(TerminalReason::Completed, None),
            RideStatus::Canceled => self.terminate(TerminalReason::Canceled, None),
            RideStatus::Error => self.terminate(TerminalReason::Error, None),
            _ => {}
        }
    }

    fn terminate(&mut self, reason: TerminalReason, message: Option<String>) {
        if self.phase.is_terminated() {
            return;
        }
        self.phase = SessionPhase::Terminated(reason);
        let ride_id = self.ride_id.as_ref().map(ToString::to_string).unwrap_or_default();

        let notice = match reason {
            TerminalReason::Completed => {
                // Ride data stays for rating; leaving is up to the user.
                info!(%ride_id, "Ride completed");
                self.ui.notify(Notice::info("Ride completed", "This ride is complete."));
                return;
            }
            TerminalReason::Canceled => {
                info!(%ride_id, "Ride canceled");
                Notice::from_server("Ride canceled", message.as_deref(), "This ride was canceled.")
            }
            TerminalReason::Error => {
                warn!(%ride_id, message = message.as_deref().unwrap_or(""), "Ride error");
                Notice::from_server(
                    "Ride unavailable",
                    message.as_deref(),
                    "Something went wrong with this ride.",
                )
            }
        };

        self.ride = None;
        self.ui.notify(notice.blocking());
        self.ui.navigate(self.role.home());
    }

    /// Customer cancel. Local state only changes once the backend
    /// confirms with `rideCanceled`.
    pub fn cancel(&mut self) -> Result<(), ActionError> {
        if self.role != Role::Customer {
            return Err(ActionError::WrongRole(self.role.as_str()));
        }
        let (Some(ride_id), Some(status)) = (self.ride_id.clone(), self.status()) else {
            return Err(ActionError::NoRide);
        };
        if self.phase.is_terminated() || !status.is_cancellable() {
            return Err(ActionError::NotAllowed {
                action: "cancel",
                status: Some(status),
            });
        }
        info!(ride_id = %ride_id, "Requesting cancellation");
        self.commands.send(RideCommand::Cancel { ride_id });
        Ok(())
    }

    /// Rider progression. In `START` the entered OTP must match exactly
    /// before `ARRIVED` is requested; in `ARRIVED` the ride completes.
    /// Status changes are applied locally at once.
    pub fn advance(&mut self, otp: Option<&str>) -> Result<RideStatus, ActionError> {
        if self.role != Role::Rider {
            return Err(ActionError::WrongRole(self.role.as_str()));
        }
        let (Some(ride_id), Some(ride)) = (self.ride_id.clone(), self.ride.as_ref()) else {
            return Err(ActionError::NoRide);
        };
        if self.phase.is_terminated() {
            return Err(ActionError::NotAllowed {
                action: "advance",
                status: Some(ride.status),
            });
        }

        let next = match ride.status {
            RideStatus::Start => {
                let matches = matches!(
                    (ride.otp.as_deref(), otp),
                    (Some(expected), Some(entered)) if expected == entered
                );
                if !matches {
                    info!(ride_id = %ride_id, "OTP mismatch");
                    self.ui.notify(Notice::error(
                        "Invalid OTP",
                        "The code does not match. Ask the customer for their OTP.",
                    ));
                    return Err(ActionError::OtpMismatch);
                }
                RideStatus::Arrived
            }
            RideStatus::Arrived => RideStatus::Completed,
            status => {
                return Err(ActionError::NotAllowed {
                    action: "advance",
                    status: Some(status),
                })
            }
        };

        self.commands.send(RideCommand::UpdateStatus {
            ride_id,
            status: next,
        });
        if let Some(ride) = self.ride.as_mut() {
            ride.status = next;
        }
        self.on_status(next);
        Ok(next)
    }

    /// The backend refused a command that was already applied locally.
    /// A refused status change is rolled back to the status it replaced,
    /// unless a newer status has arrived since.
    pub fn command_failed(&mut self, failure: CommandFailure) {
        let CommandFailure { command, message } = failure;
        let RideCommand::UpdateStatus { ride_id, status } = command else {
            debug!(?command, "Refused command has no local effect");
            return;
        };
        if self.ride_id.as_ref() != Some(&ride_id) {
            debug!(ride_id = %ride_id, "Refused status update for another ride; ignoring");
            return;
        }
        warn!(
            ride_id = %ride_id,
            %status,
            message = message.as_deref().unwrap_or(""),
            "Status update refused"
        );

        let revertible = matches!(
            self.phase,
            SessionPhase::Active | SessionPhase::Terminated(TerminalReason::Completed)
        );
        if let (true, Some(previous), Some(ride)) =
            (revertible, status.previous(), self.ride.as_mut())
        {
            if ride.status == status {
                ride.status = previous;
                self.last_status = Some(previous);
                self.phase = SessionPhase::Active;
            }
        }

        self.ui.notify(Notice::from_server(
            "Status not updated",
            message.as_deref(),
            "The ride status could not be updated. Try again.",
        ));
    }

    /// Leave a completed ride.
    pub fn return_home(&mut self) -> Result<(), ActionError> {
        if self.phase != SessionPhase::Terminated(TerminalReason::Completed) {
            return Err(ActionError::NotAllowed {
                action: "return home",
                status: self.status(),
            });
        }
        self.ui.navigate(self.role.home());
        Ok(())
    }
}
