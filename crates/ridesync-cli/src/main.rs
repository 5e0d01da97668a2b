//! ridesync: headless front-end for the ride session client.
//!
//! Each subcommand builds the shared services from the config, runs one
//! screen's worth of flow on the terminal, and tears the connection down.

mod account;
mod app;
mod cli;
mod console;
mod duty;
mod nearby;
mod ride;

use std::process::ExitCode;

use clap::Parser;
use ridesync_client::Coordinate;
use ridesync_common::{Result, Role};
use ridesync_config::schema::LoggingConfig;
use ridesync_config::{config_to_json, load_config, load_from_path, RideSyncConfig};
use tracing_subscriber::EnvFilter;

use crate::app::Services;
use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => load_from_path(path),
        None => load_config(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ridesync: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(cli.log_level.as_deref(), &config.logging);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("ridesync: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level_override: Option<&str>, config: &LoggingConfig) {
    let level = level_override.unwrap_or(config.level.as_directive());
    let fallback = format!(
        "ridesync={level},ridesync_client={level},ridesync_config={level}"
    );
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Command, config: RideSyncConfig) -> Result<()> {
    if let Command::Config = command {
        println!("{}", config_to_json(&config));
        return Ok(());
    }

    let services = Services::build(config)?;
    match command {
        Command::Login { email, role } => account::login(&services, email, role).await,
        Command::Logout => account::logout(&services).await,
        Command::Ride { role, ride } => {
            let ride_id = ride::resolve_ride(&services, ride).await;
            ride::follow(&services, role, ride_id).await
        }
        Command::Book {
            pickup_lat,
            pickup_lon,
            drop_lat,
            drop_lon,
            vehicle,
        } => {
            let ride_id = ride::book(
                &services,
                Coordinate::new(pickup_lat, pickup_lon),
                Coordinate::new(drop_lat, drop_lon),
                vehicle,
            )
            .await?;
            ride::follow(&services, Role::Customer, Some(ride_id)).await
        }
        Command::Nearby { lat, lon } => nearby::browse(&services, Coordinate::new(lat, lon)).await,
        Command::Duty { lat, lon } => {
            match duty::run(&services, Coordinate::new(lat, lon)).await? {
                Some(ride_id) => ride::follow(&services, Role::Rider, Some(ride_id)).await,
                None => Ok(()),
            }
        }
        Command::Config => Ok(()),
    }
}
