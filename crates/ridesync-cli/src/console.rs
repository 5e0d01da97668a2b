//! Terminal presentation: notices, navigation, the map surface and the
//! line commands typed while a flow is running.

use std::sync::atomic::{AtomicBool, Ordering};

use ridesync_client::session::{Counterpart, Place, RideData, SessionUi};
use ridesync_client::tracking::{DriverDetails, MapSurface, NearbyEntity, RideOffer, Viewport};
use ridesync_common::{Notice, NoticeLevel, Route};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Presentation boundary
// ---------------------------------------------------------------------------

/// Prints notices and forwards navigation requests to the running flow.
pub struct ConsoleUi {
    routes: mpsc::UnboundedSender<Route>,
}

impl ConsoleUi {
    pub fn new(routes: mpsc::UnboundedSender<Route>) -> Self {
        Self { routes }
    }
}

impl SessionUi for ConsoleUi {
    fn notify(&self, notice: Notice) {
        println!("{}", format_notice(&notice));
    }

    fn navigate(&self, route: Route) {
        println!("-> {}", route_label(route));
        let _ = self.routes.send(route);
    }
}

/// Prints viewport changes instead of animating a map.
pub struct ConsoleMap {
    loaded: AtomicBool,
}

impl Default for ConsoleMap {
    fn default() -> Self {
        Self {
            loaded: AtomicBool::new(true),
        }
    }
}

impl MapSurface for ConsoleMap {
    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Relaxed)
    }

    fn animate_to(&self, viewport: Viewport) {
        println!("{}", format_viewport(&viewport));
    }
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

pub fn format_notice(notice: &Notice) -> String {
    let tag = match notice.level {
        NoticeLevel::Info => "info",
        NoticeLevel::Warning => "warning",
        NoticeLevel::Error => "error",
    };
    let mut line = format!("[{tag}] {}: {}", notice.title, notice.body);
    if notice.blocking {
        line.push_str(" (acknowledged)");
    }
    line
}

pub fn route_label(route: Route) -> &'static str {
    match route {
        Route::RoleSelection => "role selection",
        Route::CustomerHome => "customer home",
        Route::RiderHome => "rider home",
    }
}

pub fn format_viewport(viewport: &Viewport) -> String {
    format!(
        "map: center {:.5}, {:.5} span {:.4} x {:.4}",
        viewport.center.latitude,
        viewport.center.longitude,
        viewport.latitude_delta,
        viewport.longitude_delta
    )
}

fn counterpart_label(counterpart: Option<&Counterpart>) -> String {
    match counterpart {
        Some(c) => c
            .name()
            .or_else(|| c.id())
            .unwrap_or("unknown")
            .to_string(),
        None => "-".to_string(),
    }
}

pub fn format_ride(ride: &RideData) -> String {
    let place = |p: Option<&Place>| match p {
        Some(p) => match &p.address {
            Some(address) => address.clone(),
            None => format!("{:.5}, {:.5}", p.latitude, p.longitude),
        },
        None => "-".to_string(),
    };
    let mut lines = vec![
        format!("ride {} [{}]", ride.id, ride.status),
        format!("  pickup:   {}", place(ride.pickup.as_ref())),
        format!("  drop:     {}", place(ride.drop.as_ref())),
    ];
    if let Some(fare) = ride.fare {
        lines.push(format!("  fare:     {fare:.2}"));
    }
    if let Some(vehicle) = &ride.vehicle {
        lines.push(format!("  vehicle:  {vehicle}"));
    }
    if let Some(otp) = &ride.otp {
        lines.push(format!("  otp:      {otp}"));
    }
    lines.push(format!("  customer: {}", counterpart_label(ride.customer.as_ref())));
    lines.push(format!("  rider:    {}", counterpart_label(ride.rider.as_ref())));
    lines.join("\n")
}

pub fn format_entity(entity: &NearbyEntity) -> String {
    let position = &entity.position;
    let mut line = format!(
        "{:<12} {:>10.5} {:>11.5}",
        entity.id, position.coordinate.latitude, position.coordinate.longitude
    );
    if let Some(vehicle) = &entity.vehicle {
        line.push_str(&format!("  {vehicle}"));
    }
    if let Some(heading) = position.heading {
        line.push_str(&format!("  heading {heading:.0}"));
    }
    line
}

pub fn format_details(details: &DriverDetails) -> String {
    let mut line = format!("driver {}", details.id);
    if let Some(name) = &details.name {
        line.push_str(&format!(" {name}"));
    }
    if let Some(phone) = &details.phone {
        line.push_str(&format!(" tel {phone}"));
    }
    if let Some(vehicle) = &details.vehicle {
        line.push_str(&format!(" {vehicle}"));
    }
    if let Some(rating) = details.rating {
        line.push_str(&format!(" rated {rating:.1}"));
    }
    if details.degraded {
        line.push_str(" (offline details)");
    }
    line
}

pub fn format_offer(offer: &RideOffer) -> String {
    let mut line = format!("offer {}", offer.ride_id);
    if let Some(pickup) = &offer.pickup {
        match &pickup.address {
            Some(address) => line.push_str(&format!(" from {address}")),
            None => line.push_str(&format!(
                " from {:.5}, {:.5}",
                pickup.latitude, pickup.longitude
            )),
        }
    }
    if let Some(fare) = offer.fare {
        line.push_str(&format!(" fare {fare:.2}"));
    }
    if let Some(vehicle) = &offer.vehicle {
        line.push_str(&format!(" [{vehicle}]"));
    }
    line
}

// ---------------------------------------------------------------------------
// Line commands
// ---------------------------------------------------------------------------

/// A command typed on stdin while a flow runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Help,
    Quit,
    /// Print the current state.
    Show,
    /// Simulated pan/zoom on the map.
    Pan,
    /// Rider: confirm pickup with the OTP, or complete the ride.
    Advance(Option<String>),
    /// Customer: ask the server to cancel.
    Cancel,
    /// Leave a completed ride.
    Home,
    Rate { stars: u8, comment: Option<String> },
    Details(String),
    Location { latitude: f64, longitude: f64, heading: Option<f64> },
    OnDuty,
    OffDuty,
    Open(String),
}

impl Input {
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = words.collect();

        let input = match (verb.to_ascii_lowercase().as_str(), rest.as_slice()) {
            ("help" | "?", []) => Input::Help,
            ("quit" | "exit" | "q", []) => Input::Quit,
            ("show" | "status" | "list", []) => Input::Show,
            ("pan", []) => Input::Pan,
            ("advance", []) => Input::Advance(None),
            ("advance" | "otp", [code]) => Input::Advance(Some(code.to_string())),
            ("cancel", []) => Input::Cancel,
            ("home", []) => Input::Home,
            ("rate", [stars, comment @ ..]) => Input::Rate {
                stars: stars
                    .parse()
                    .map_err(|_| format!("'{stars}' is not a rating"))?,
                comment: (!comment.is_empty()).then(|| comment.join(" ")),
            },
            ("details", [id]) => Input::Details(id.to_string()),
            ("loc", [lat, lon]) | ("loc", [lat, lon, _]) => Input::Location {
                latitude: number(lat)?,
                longitude: number(lon)?,
                heading: rest.get(2).map(|h| number(h)).transpose()?,
            },
            ("on", []) => Input::OnDuty,
            ("off", []) => Input::OffDuty,
            ("open", [id]) => Input::Open(id.to_string()),
            _ => return Err(format!("unrecognized command '{}'", line.trim())),
        };
        Ok(Some(input))
    }
}

fn number(text: &str) -> Result<f64, String> {
    text.parse().map_err(|_| format!("'{text}' is not a number"))
}
