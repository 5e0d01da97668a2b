//! Ride Session Controller.
//!
//! Binds one ride's lifecycle events to local state, mirrors the
//! backend's status machine and turns terminal conditions into notices
//! and navigation for the presentation layer.

mod binding;
mod commands;
mod controller;
mod events;
mod state;


pub use binding::{LiveRideSession, SessionBinding, RIDE_EVENTS};
pub use commands::{CommandFailure, CommandSink, Confirmation, RideCommand, SocketCommandSink};
pub use controller::{ActionError, RideSessionController, SessionUi};
pub use events::RideEvent;
pub use state::{
    Counterpart, Place, Profile, RideData, RideStatus, RideUpdate, SessionPhase, TerminalReason,
};
