//! Rider duty: availability, location publishing and incoming offers.

use std::sync::Arc;

use ridesync_client::session::SocketCommandSink;
use ridesync_client::tracking::{offer_feed, DutyController};
use ridesync_client::Coordinate;
use ridesync_common::{Notice, Result, RideId, RideSyncError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::app::{watch_channel, ChannelEvent, Services};
use crate::console::{format_notice, format_offer, Input};

const HELP: &str = "Commands: on, off, loc <lat> <lon> [heading], show, open <ride id>, quit";

/// Go on duty at `start` and wait for offers. Returns the ride the rider
/// chose to open, if any.
pub async fn run(services: &Services, start: Coordinate) -> Result<Option<RideId>> {
    let (mut channel, mut channel_events) = watch_channel(&services.connection);
    services.open_channel().await?;

    let commands = Arc::new(SocketCommandSink::new(
        services.connection.clone(),
        Some(Arc::clone(&services.api)),
    ));
    let mut duty = DutyController::new(commands);
    let (mut offers, mut offer_events) = offer_feed(&services.connection);

    duty.go_on_duty();
    duty.publish_location(start, None)
        .map_err(|e| RideSyncError::Other(e.to_string()))?;
    println!("On duty at {start}");
    println!("{HELP}");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let result = loop {
        tokio::select! {
            line = stdin.next_line() => match line {
                Ok(Some(line)) => match Input::parse(&line) {
                    Ok(Some(Input::Quit)) => break Ok(None),
                    Ok(Some(Input::Help)) => println!("{HELP}"),
                    Ok(Some(Input::OnDuty)) => {
                        if duty.go_on_duty() {
                            println!("On duty");
                        }
                    }
                    Ok(Some(Input::OffDuty)) => {
                        if duty.go_off_duty() {
                            println!("Off duty; pending offers cleared");
                        }
                    }
                    Ok(Some(Input::Location { latitude, longitude, heading })) => {
                        match duty.publish_location(Coordinate::new(latitude, longitude), heading) {
                            Ok(true) => debug!(latitude, longitude, "Location published"),
                            Ok(false) => println!("Off duty; location not shared"),
                            Err(e) => println!("{e}"),
                        }
                    }
                    Ok(Some(Input::Show)) => {
                        let mut any = false;
                        for offer in duty.offers() {
                            println!("{}", format_offer(offer));
                            any = true;
                        }
                        if !any {
                            println!("No offers");
                        }
                    }
                    Ok(Some(Input::Open(id))) => match duty.take_offer(&RideId::from(id.as_str())) {
                        Some(offer) => break Ok(Some(offer.ride_id)),
                        None => println!("No offer for ride '{id}'"),
                    },
                    Ok(Some(other)) => println!("{other:?} is not available while on duty"),
                    Ok(None) => {}
                    Err(message) => println!("{message}"),
                },
                Ok(None) => break Ok(None),
                Err(e) => break Err(RideSyncError::Io(e)),
            },
            Some(payload) = offer_events.recv() => match duty.record_offer(&payload) {
                Ok(Some(ride_id)) => {
                    if let Some(offer) = duty.offers().find(|o| o.ride_id == ride_id) {
                        println!("{}", format_offer(offer));
                    }
                }
                Ok(None) => debug!("Offer ignored while off duty"),
                Err(e) => warn!(error = %e, "Unreadable ride offer"),
            },
            Some(event) = channel_events.recv() => match event {
                ChannelEvent::AuthExpired(message) => {
                    if let Err(e) = services.api.tokens().clear() {
                        warn!(error = %e, "Failed to clear tokens");
                    }
                    break Err(RideSyncError::Auth(message));
                }
                ChannelEvent::ConnectError(message) => {
                    let notice = Notice::from_server(
                        "Connection problem",
                        Some(&message),
                        "Could not reach the server",
                    );
                    println!("{}", format_notice(&notice));
                }
                ChannelEvent::Disconnected => {
                    let notice = Notice::warning(
                        "Connection lost",
                        "Offers will not arrive until reconnected",
                    );
                    println!("{}", format_notice(&notice));
                }
                ChannelEvent::Connected => {}
            },
            _ = tokio::signal::ctrl_c() => break Ok(None),
        }
    };

    offers.release();
    channel.release();
    if !matches!(result, Ok(Some(_))) {
        duty.go_off_duty();
        services.shutdown();
    }
    result
}
