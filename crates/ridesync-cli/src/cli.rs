//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ridesync_common::Role;

#[derive(Parser)]
#[command(name = "ridesync", version, about = "Headless ride session client")]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset. Overrides `[logging] level`.
    #[arg(long, global = true, value_parser = ["trace", "debug", "info", "warn", "error"])]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Sign in and store the session tokens. The password is read from stdin.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        role: Role,
    },

    /// Sign out and clear stored state.
    Logout,

    /// Follow a ride. Without --ride, resumes the ride in progress.
    Ride {
        #[arg(long)]
        role: Role,
        #[arg(long)]
        ride: Option<String>,
    },

    /// Request a ride as a customer, then follow it.
    Book {
        #[arg(long, allow_hyphen_values = true)]
        pickup_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        pickup_lon: f64,
        #[arg(long, allow_hyphen_values = true)]
        drop_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        drop_lon: f64,
        /// Vehicle category, e.g. `bike` or `car`.
        #[arg(long, default_value = "bike")]
        vehicle: String,
    },

    /// Browse available riders around a point.
    Nearby {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },

    /// Go on duty as a rider at a starting location and watch for offers.
    Duty {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },

    /// Print the effective configuration as JSON.
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ride_accepts_role_and_optional_id() {
        let cli =
            Cli::try_parse_from(["ridesync", "ride", "--role", "rider", "--ride", "r1"]).unwrap();
        match cli.command {
            Command::Ride { role, ride } => {
                assert_eq!(role, Role::Rider);
                assert_eq!(ride.as_deref(), Some("r1"));
            }
            _ => panic!("expected ride command"),
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!(Cli::try_parse_from(["ridesync", "ride", "--role", "driver"]).is_err());
    }

    #[test]
    fn negative_coordinates_parse() {
        let cli = Cli::try_parse_from(["ridesync", "nearby", "--lat", "-33.9", "--lon", "151.2"])
            .unwrap();
        match cli.command {
            Command::Nearby { lat, lon } => {
                assert_eq!(lat, -33.9);
                assert_eq!(lon, 151.2);
            }
            _ => panic!("expected nearby command"),
        }
    }

    #[test]
    fn global_options_after_subcommand() {
        let cli = Cli::try_parse_from(["ridesync", "config", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(Cli::try_parse_from(["ridesync", "config", "--log-level", "loud"]).is_err());
    }
}
