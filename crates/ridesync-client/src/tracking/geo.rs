use std::cmp;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Smallest span, in degrees, a computed viewport may have.
pub const MIN_VIEWPORT_SPAN: f64 = 0.01;

#[derive(Debug, Clone, Copy, Default)]
pub struct Distance(f64);

impl PartialEq for Distance {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl Distance {
    pub const fn from_meters(distance: f64) -> Self {
        Self(distance)
    }

    pub const fn from_kilometers(distance: f64) -> Self {
        Self(distance * 1000.0)
    }

    pub const fn as_meters(&self) -> f64 {
        self.0
    }

    pub const fn as_kilometers(&self) -> f64 {
        self.0 / 1000.0
    }
}

impl Display for Distance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 < 1000.0 {
            write!(f, "{:.0} m", self.0)
        } else {
            write!(f, "{:.1} km", self.as_kilometers())
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}, {}", self.latitude, self.longitude))
    }
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Finite and within [-90, 90] x [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle (haversine) distance.
    pub fn distance_to(&self, coord: &Self) -> Distance {
        let dist_lat = f64::to_radians(coord.latitude - self.latitude);
        let dist_lon = f64::to_radians(coord.longitude - self.longitude);
        let a = f64::powi(f64::sin(dist_lat / 2.0), 2)
            + f64::cos(f64::to_radians(self.latitude))
                * f64::cos(f64::to_radians(coord.latitude))
                * f64::powi(f64::sin(dist_lon / 2.0), 2);
        // Rounding can push `a` a hair past 1 for antipodal points.
        let a = a.clamp(0.0, 1.0);
        let c = 2.0 * f64::atan2(f64::sqrt(a), f64::sqrt(1.0 - a));
        Distance::from_kilometers(EARTH_RADIUS_KM * c)
    }
}

/// A map region given by its center and degree spans.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub center: Coordinate,
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

impl Viewport {
    /// Bounding region around every valid coordinate, grown by `padding`
    /// (a fraction of the span on each axis). `None` when nothing is valid.
    pub fn covering(coordinates: &[Coordinate], padding: f64) -> Option<Self> {
        let mut valid = coordinates.iter().filter(|c| c.is_valid());
        let first = valid.next()?;
        let (mut min_lat, mut max_lat) = (first.latitude, first.latitude);
        let (mut min_lon, mut max_lon) = (first.longitude, first.longitude);
        for c in valid {
            min_lat = min_lat.min(c.latitude);
            max_lat = max_lat.max(c.latitude);
            min_lon = min_lon.min(c.longitude);
            max_lon = max_lon.max(c.longitude);
        }

        let scale = 1.0 + padding.max(0.0) * 2.0;
        Some(Self {
            center: Coordinate::new((min_lat + max_lat) / 2.0, (min_lon + max_lon) / 2.0),
            latitude_delta: ((max_lat - min_lat) * scale).max(MIN_VIEWPORT_SPAN),
            longitude_delta: ((max_lon - min_lon) * scale).max(MIN_VIEWPORT_SPAN),
        })
    }

    pub fn contains(&self, coord: &Coordinate) -> bool {
        (coord.latitude - self.center.latitude).abs() <= self.latitude_delta / 2.0
            && (coord.longitude - self.center.longitude).abs() <= self.longitude_delta / 2.0
    }
}

/// Circle around a center; positions outside it are out of service range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceArea {
    pub center: Coordinate,
    pub radius: Distance,
}

impl ServiceArea {
    pub fn new(center: Coordinate, radius: Distance) -> Self {
        Self { center, radius }
    }

    pub fn contains(&self, coord: &Coordinate) -> bool {
        self.center.distance_to(coord) <= self.radius
    }
}
