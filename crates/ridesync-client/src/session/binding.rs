//! Wires a controller to the shared connection for a screen's lifetime.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use super::commands::CommandFailure;
use super::controller::RideSessionController;
use super::events::RideEvent;
use crate::protocol::inbound;
use crate::transport::{ConnectionManager, Subscription};

/// Ride-scoped inbound events.
pub const RIDE_EVENTS: [&str; 4] = [
    inbound::RIDE_DATA,
    inbound::RIDE_UPDATE,
    inbound::RIDE_CANCELED,
    inbound::ERROR,
];

/// Binds the ride-scoped events and forwards them as typed [`RideEvent`]s.
/// Malformed payloads are dropped here.
pub struct SessionBinding {
    subscription: Subscription,
}

impl SessionBinding {
    pub fn bind(connection: &ConnectionManager) -> (Self, mpsc::UnboundedReceiver<RideEvent>) {
        let (subscription, rx) = Subscription::forward(connection, &RIDE_EVENTS, |event, payload| {
            match RideEvent::from_wire(event, &payload) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    debug!(event, error = %e, "Dropping malformed ride event");
                    None
                }
            }
        });
        (Self { subscription }, rx)
    }

    pub fn release(&mut self) {
        self.subscription.release();
    }
}

/// A mounted ride screen: binding, controller and the task feeding it.
pub struct LiveRideSession {
    controller: Arc<Mutex<RideSessionController>>,
    binding: Option<SessionBinding>,
    task: Option<JoinHandle<()>>,
}

impl LiveRideSession {
    /// Bind events, then mount the controller. Must run inside a Tokio
    /// runtime. A controller without a ride id binds nothing.
    pub fn mount(connection: &ConnectionManager, controller: RideSessionController) -> Self {
        Self::start(connection, controller, None)
    }

    /// Like [`mount`](Self::mount), also feeding refused commands back
    /// into the controller.
    pub fn mount_with_failures(
        connection: &ConnectionManager,
        controller: RideSessionController,
        failures: mpsc::UnboundedReceiver<CommandFailure>,
    ) -> Self {
        Self::start(connection, controller, Some(failures))
    }

    fn start(
        connection: &ConnectionManager,
        mut controller: RideSessionController,
        mut failures: Option<mpsc::UnboundedReceiver<CommandFailure>>,
    ) -> Self {
        if controller.ride_id().is_none() {
            controller.mount();
            return Self {
                controller: Arc::new(Mutex::new(controller)),
                binding: None,
                task: None,
            };
        }

        // Bound before subscribing so the first snapshot cannot be missed.
        let (binding, mut events) = SessionBinding::bind(connection);
        controller.mount();
        let controller = Arc::new(Mutex::new(controller));

        let driver = Arc::clone(&controller);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(event) => driver.lock().await.handle(event),
                        None => break,
                    },
                    failure = next_failure(&mut failures) => match failure {
                        Some(failure) => driver.lock().await.command_failed(failure),
                        None => failures = None,
                    },
                }
            }
            debug!("Ride event stream closed");
        });

        Self {
            controller,
            binding: Some(binding),
            task: Some(task),
        }
    }

    pub fn controller(&self) -> Arc<Mutex<RideSessionController>> {
        Arc::clone(&self.controller)
    }

    pub fn is_mounted(&self) -> bool {
        self.binding.is_some()
    }

    /// Release the ride-scoped bindings regardless of session state.
    /// Idempotent.
    pub fn unmount(&mut self) {
        if let Some(mut binding) = self.binding.take() {
            binding.release();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn next_failure(
    failures: &mut Option<mpsc::UnboundedReceiver<CommandFailure>>,
) -> Option<CommandFailure> {
    match failures {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl Drop for LiveRideSession {
    fn drop(&mut self) {
        self.unmount();
    }
}
