//! Browsing available riders before booking.

use std::sync::Arc;

use ridesync_client::tracking::{lookup_driver_details, FeedEvent, PositionFeed, PositionReconciler};
use ridesync_client::{address_or_placeholder, Coordinate};
use ridesync_common::{Notice, Result, RideSyncError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::app::{watch_channel, ChannelEvent, Services};
use crate::console::{format_details, format_entity, format_notice, ConsoleMap, Input};

pub async fn browse(services: &Services, center: Coordinate) -> Result<()> {
    if !center.is_valid() {
        return Err(RideSyncError::Other(format!("invalid coordinate: {center}")));
    }

    let geocoder = services.geocoder();
    let address = address_or_placeholder(
        geocoder.as_deref(),
        center,
        &services.config.tracking.placeholder_address,
    )
    .await;
    println!("Browsing near {address} ({center})");

    let (mut channel, mut channel_events) = watch_channel(&services.connection);
    services.open_channel().await?;

    let (mut feed, mut events) = PositionFeed::bind(&services.connection);
    feed.subscribe_zone(center)
        .map_err(|e| RideSyncError::Other(e.to_string()))?;

    let mut reconciler =
        PositionReconciler::new(services.reconciler_config(), Arc::new(ConsoleMap::default()));
    if reconciler.check_service_range(center) {
        println!(
            "{}",
            format_notice(&Notice::warning(
                "Out of service range",
                "This area is outside the service range",
            ))
        );
    }

    let correlator = services.correlator();
    let cancel = CancellationToken::new();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    println!("Commands: show, details <id>, pan, quit");

    let result = loop {
        tokio::select! {
            line = stdin.next_line() => match line {
                Ok(Some(line)) => match Input::parse(&line) {
                    Ok(Some(Input::Quit)) => break Ok(()),
                    Ok(Some(Input::Help)) => println!("Commands: show, details <id>, pan, quit"),
                    Ok(Some(Input::Show)) => print_entities(&reconciler),
                    Ok(Some(Input::Pan)) => reconciler.note_gesture(),
                    Ok(Some(Input::Details(id))) => {
                        let Some(entity) = reconciler.nearby(&id).cloned() else {
                            println!("No rider '{id}' nearby");
                            continue;
                        };
                        let details = tokio::select! {
                            details = lookup_driver_details(&correlator, &entity, &cancel) => {
                                details
                            }
                            _ = tokio::signal::ctrl_c() => {
                                cancel.cancel();
                                break Ok(());
                            }
                        };
                        println!("{}", format_details(&details));
                    }
                    Ok(Some(other)) => println!("{other:?} is not available while browsing"),
                    Ok(None) => {}
                    Err(message) => println!("{message}"),
                },
                Ok(None) => break Ok(()),
                Err(e) => break Err(RideSyncError::Io(e)),
            },
            Some(event) = events.recv() => {
                if let FeedEvent::Nearby(_) = &event {
                    reconciler.apply(&event, None);
                    let entities = reconciler.nearby_entities();
                    debug!(count = entities.len(), "Nearby set replaced");
                    println!("{} riders nearby", entities.len());

                    let mut targets: Vec<Coordinate> =
                        entities.iter().map(|e| e.position.coordinate).collect();
                    targets.push(center);
                    reconciler.recenter(&targets);
                }
            }
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
                        "Nearby riders are no longer updating",
                    );
                    println!("{}", format_notice(&notice));
                }
                ChannelEvent::Connected => {}
            },
            _ = tokio::signal::ctrl_c() => break Ok(()),
        }
    };

    cancel.cancel();
    feed.release();
    channel.release();
    services.shutdown();
    result
}

fn print_entities(reconciler: &PositionReconciler) {
    let entities = reconciler.nearby_entities();
    if entities.is_empty() {
        println!("No riders nearby yet");
        return;
    }
    for entity in entities {
        println!("{}", format_entity(entity));
    }
}
