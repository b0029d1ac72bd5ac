//! Geographic primitives: coordinates and great-circle distance.

use serde::{Deserialize, Serialize};

/// Earth radius in miles, as used by the dispatch radius math.
pub const EARTH_RADIUS_MILES: f64 = 3959.0;

/// Candidates farther than this from the job site are not dispatchable.
pub const DISPATCH_RADIUS_MILES: f64 = 50.0;

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance to another point, in miles.
    pub fn distance_miles(&self, other: &GeoPoint) -> f64 {
        haversine_miles(self, other)
    }

    /// Whether the point lies strictly inside the dispatch radius of `center`.
    ///
    /// The boundary is exclusive: a candidate at exactly the radius is out.
    pub fn within_dispatch_radius(&self, center: &GeoPoint) -> bool {
        self.distance_miles(center) < DISPATCH_RADIUS_MILES
    }
}

/// Haversine great-circle distance between two points, in miles.
pub fn haversine_miles(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().asin();

    EARTH_RADIUS_MILES * c
}
