//! Geodesic distance between coordinates.

use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, uniffi::Record)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    fn to_point(self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// Haversine distance between two coordinates in meters.
///
/// Symmetric and non-negative. Identical coordinates yield exactly zero.
/// NaN inputs propagate; callers must supply valid coordinates.
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    if a == b {
        return 0.0;
    }
    Haversine::distance(a.to_point(), b.to_point())
}

/// Distance between two coordinates in meters, exported for the host.
#[uniffi::export]
pub fn distance_between(a: Coordinate, b: Coordinate) -> f64 {
    distance_meters(a, b)
}
