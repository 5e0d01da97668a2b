//! The live ride screen: one session, its rider marker and user actions.

use std::sync::Arc;
use std::time::Duration;

use ridesync_client::api::{NewRide, Rating};
use ridesync_client::session::{
    Counterpart, LiveRideSession, Place, RideData, RideSessionController, SessionPhase,
    SocketCommandSink, TerminalReason,
};
use ridesync_client::tracking::{FeedEvent, PositionFeed, PositionReconciler};
use ridesync_client::{address_or_placeholder, Coordinate, SessionUi};
use ridesync_common::{Notice, Result, RideId, RideSyncError, Role, Route};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::app::{api_error, watch_channel, ChannelEvent, Services, LAST_RIDE_KEY};
use crate::console::{format_notice, format_ride, ConsoleMap, ConsoleUi, Input};

/// How often the screen checks whether the ride names a rider to track.
const TRACK_POLL: Duration = Duration::from_secs(1);

/// The ride id given on the command line, else the ride in progress,
/// else the last ride followed when the backend cannot be asked.
pub async fn resolve_ride(services: &Services, requested: Option<String>) -> Option<RideId> {
    if let Some(id) = requested {
        return Some(RideId::from(id));
    }
    match services.api.in_progress_ride().await {
        Ok(Some(ride)) => {
            info!(ride_id = %ride.id, status = %ride.status, "Resuming ride in progress");
            Some(ride.id)
        }
        Ok(None) => {
            debug!("No ride in progress");
            None
        }
        Err(e) => {
            warn!(error = %e, "In-progress lookup failed; using the last followed ride");
            services.recall(LAST_RIDE_KEY).map(RideId::from)
        }
    }
}

/// Create a ride request and return its id.
pub async fn book(
    services: &Services,
    pickup: Coordinate,
    drop: Coordinate,
    vehicle: String,
) -> Result<RideId> {
    for coordinate in [pickup, drop] {
        if !coordinate.is_valid() {
            return Err(RideSyncError::Other(format!(
                "invalid coordinate: {coordinate}"
            )));
        }
    }

    let geocoder = services.geocoder();
    let placeholder = &services.config.tracking.placeholder_address;
    let pickup_address = address_or_placeholder(geocoder.as_deref(), pickup, placeholder).await;
    let drop_address = address_or_placeholder(geocoder.as_deref(), drop, placeholder).await;

    let request = NewRide {
        pickup: place(pickup, pickup_address),
        drop: place(drop, drop_address),
        vehicle,
    };
    let ride = services
        .api
        .create_ride(&request)
        .await
        .map_err(api_error)?;
    println!("Requested ride {} [{}]", ride.id, ride.status);
    Ok(ride.id)
}

fn place(coordinate: Coordinate, address: String) -> Place {
    Place {
        latitude: coordinate.latitude,
        longitude: coordinate.longitude,
        address: Some(address),
    }
}

// ---------------------------------------------------------------------------
// Rider marker
// ---------------------------------------------------------------------------

/// Follows the assigned rider's position for the customer's map.
struct RiderTracker {
    feed: PositionFeed,
    reconciler: PositionReconciler,
    rider: Option<String>,
}

impl RiderTracker {
    fn bind(services: &Services) -> (Self, mpsc::UnboundedReceiver<FeedEvent>) {
        let (feed, events) = PositionFeed::bind(&services.connection);
        let reconciler =
            PositionReconciler::new(services.reconciler_config(), Arc::new(ConsoleMap::default()));
        (
            Self {
                feed,
                reconciler,
                rider: None,
            },
            events,
        )
    }

    /// Subscribe once the ride names its rider, and again if it changes.
    fn follow(&mut self, ride: Option<&RideData>) {
        let Some(rider) = ride
            .and_then(|r| r.rider.as_ref())
            .and_then(Counterpart::id)
        else {
            return;
        };
        if self.rider.as_deref() == Some(rider) {
            return;
        }
        self.feed.subscribe_rider(rider);
        self.rider = Some(rider.to_string());
    }

    fn apply(&mut self, event: FeedEvent, ride: Option<&RideData>) {
        self.reconciler.apply(&event, self.rider.as_deref());

        let rider_position = self
            .rider
            .as_deref()
            .and_then(|id| self.reconciler.position(id))
            .map(|sample| sample.coordinate);
        let Some(rider_position) = rider_position else {
            return;
        };

        let was_out = self.reconciler.out_of_service_range();
        let out = self.reconciler.check_service_range(rider_position);
        if out && !was_out {
            println!("{}", format_notice(&Notice::warning(
                "Out of service range",
                "The rider is outside the service area",
            )));
        }

        let mut targets = vec![rider_position];
        if let Some(pickup) = ride.and_then(|r| r.pickup.as_ref()) {
            targets.push(Coordinate::new(pickup.latitude, pickup.longitude));
        }
        self.reconciler.recenter(&targets);
    }

    fn release(&mut self) {
        self.feed.release();
    }
}

// ---------------------------------------------------------------------------
// Screen loop
// ---------------------------------------------------------------------------

/// Mount a session for `ride_id` and run it until the user leaves, the
/// session navigates away, or the sign-in expires.
pub async fn follow(
    services: &Services,
    role: Role,
    ride_id: Option<RideId>,
) -> Result<()> {
    let (mut channel, mut channel_events) = watch_channel(&services.connection);
    services.open_channel().await?;

    if let Some(id) = &ride_id {
        services.remember(LAST_RIDE_KEY, Some(id.as_str()));
    }

    let (routes_tx, mut routes) = mpsc::unbounded_channel();
    let ui = Arc::new(ConsoleUi::new(routes_tx));
    let (commands, failures) =
        SocketCommandSink::new(services.connection.clone(), Some(Arc::clone(&services.api)))
            .with_failures();
    let controller = RideSessionController::new(role, ride_id, Arc::new(commands), ui.clone());
    let mut session =
        LiveRideSession::mount_with_failures(&services.connection, controller, failures);
    if !session.is_mounted() {
        println!("No ride to follow.");
    }
    let controller = session.controller();

    let (mut tracker, mut positions) = RiderTracker::bind(services);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut poll = tokio::time::interval(TRACK_POLL);
    print_help(role);

    let result = loop {
        tokio::select! {
            line = stdin.next_line() => match line {
                Ok(Some(line)) => match Input::parse(&line) {
                    Ok(Some(Input::Quit)) => break Ok(()),
                    Ok(Some(input)) => {
                        handle_input(services, &controller, &mut tracker, role, input).await
                    }
                    Ok(None) => {}
                    Err(message) => println!("{message}"),
                },
                Ok(None) => break Ok(()),
                Err(e) => break Err(RideSyncError::Io(e)),
            },
            Some(route) = routes.recv() => {
                debug!(?route, "Leaving the ride screen");
                services.remember(LAST_RIDE_KEY, None);
                break Ok(());
            }
            Some(event) = positions.recv() => {
                let controller = controller.lock().await;
                tracker.apply(event, controller.ride());
            }
            Some(event) = channel_events.recv() => match event {
                ChannelEvent::AuthExpired(message) => {
                    let notice = Notice::from_server(
                        "Session expired",
                        Some(&message),
                        "Please sign in again",
                    );
                    ui.notify(notice.blocking());
                    if let Err(e) = services.api.tokens().clear() {
                        warn!(error = %e, "Failed to clear tokens");
                    }
                    ui.navigate(Route::RoleSelection);
                    break Err(RideSyncError::Auth(message));
                }
                ChannelEvent::ConnectError(message) => {
                    ui.notify(Notice::from_server(
                        "Connection problem",
                        Some(&message),
                        "Could not reach the server",
                    ));
                }
                ChannelEvent::Disconnected => {
                    ui.notify(Notice::warning("Connection lost", "Live updates have stopped"));
                }
                ChannelEvent::Connected => debug!("Channel open"),
            },
            _ = poll.tick(), if role == Role::Customer => {
                let controller = controller.lock().await;
                tracker.follow(controller.ride());
            }
            _ = tokio::signal::ctrl_c() => break Ok(()),
        }
    };

    tracker.release();
    session.unmount();
    channel.release();
    services.shutdown();
    result
}

fn print_help(role: Role) {
    let actions = match role {
        Role::Customer => "cancel, rate <1-5> [comment], home",
        Role::Rider => "otp <code>, advance, rate <1-5> [comment], home",
    };
    println!("Commands: show, pan, {actions}, quit");
}

fn reject(error: impl std::fmt::Display) {
    println!("{}", format_notice(&Notice::error("Not allowed", error.to_string())));
}

async fn handle_input(
    services: &Services,
    controller: &Mutex<RideSessionController>,
    tracker: &mut RiderTracker,
    role: Role,
    input: Input,
) {
    match input {
        Input::Help => print_help(role),
        Input::Show => {
            let controller = controller.lock().await;
            match controller.ride() {
                Some(ride) => println!("{}", format_ride(ride)),
                None => println!("No ride data ({:?})", controller.phase()),
            }
        }
        Input::Pan => tracker.reconciler.note_gesture(),
        Input::Advance(code) => match controller.lock().await.advance(code.as_deref()) {
            Ok(status) => println!("Requested {status}"),
            Err(e) => reject(e),
        },
        Input::Cancel => match controller.lock().await.cancel() {
            Ok(()) => println!("Cancellation requested; waiting for the server"),
            Err(e) => reject(e),
        },
        Input::Home => {
            if let Err(e) = controller.lock().await.return_home() {
                reject(e);
            }
        }
        Input::Rate { stars, comment } => rate(services, controller, stars, comment).await,
        other => println!("{other:?} is not available on the ride screen"),
    }
}

async fn rate(
    services: &Services,
    controller: &Mutex<RideSessionController>,
    stars: u8,
    comment: Option<String>,
) {
    let ride_id = {
        let controller = controller.lock().await;
        if controller.phase() != SessionPhase::Terminated(TerminalReason::Completed) {
            reject("rides can be rated once completed");
            return;
        }
        controller.ride_id().cloned()
    };
    let Some(ride_id) = ride_id else {
        return;
    };

    let rating = Rating {
        ride_id: ride_id.to_string(),
        rating: stars,
        comment,
    };
    match services.api.submit_rating(&rating).await {
        Ok(()) => println!("Thanks for rating ride {ride_id}"),
        Err(e) => {
            let fallback = e.to_string();
            println!(
                "{}",
                format_notice(&Notice::from_server("Rating failed", e.server_message(), &fallback))
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booked_places_carry_their_address() {
        let pickup = place(Coordinate::new(14.6, 120.9), "Rizal Park".into());
        assert_eq!(pickup.latitude, 14.6);
        assert_eq!(pickup.address.as_deref(), Some("Rizal Park"));
    }

    #[tokio::test]
    async fn explicit_ride_id_skips_the_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ridesync_config::RideSyncConfig::default();
        config.storage.directory = Some(dir.path().to_path_buf());
        let services = Services::build(config).unwrap();

        let ride = resolve_ride(&services, Some("r9".into())).await;
        assert_eq!(ride, Some(RideId::from("r9")));
    }

    #[tokio::test]
    async fn failed_lookup_falls_back_to_the_last_ride() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ridesync_config::RideSyncConfig::default();
        config.storage.directory = Some(dir.path().to_path_buf());
        // Nothing listens here, and no one is signed in.
        config.api.base_url = "http://127.0.0.1:9".into();
        let services = Services::build(config).unwrap();
        services.remember(LAST_RIDE_KEY, Some("r4"));

        let ride = resolve_ride(&services, None).await;
        assert_eq!(ride, Some(RideId::from("r4")));
    }

    #[tokio::test]
    async fn booking_rejects_invalid_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ridesync_config::RideSyncConfig::default();
        config.storage.directory = Some(dir.path().to_path_buf());
        let services = Services::build(config).unwrap();

        let err = book(
            &services,
            Coordinate::new(91.0, 0.0),
            Coordinate::new(14.6, 120.9),
            "bike".into(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RideSyncError::Other(_)));
    }
}
