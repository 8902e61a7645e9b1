//! Great-circle distance between geocoded points.
//!
//! Stores are geocoded once when they are registered; buyers optionally share a
//! location. Distances are used only for radius filtering and feed ordering, so the
//! spherical Haversine approximation is precise enough.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Geographic coordinates in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, positive north
    pub latitude: f64,
    /// Longitude in degrees, positive east
    pub longitude: f64,
}

impl GeoPoint {
    /// Creates a point from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Haversine distance in kilometers to another point.
    #[must_use]
    pub fn distance_km(&self, other: &Self) -> f64 {
        distance_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// Haversine distance in kilometers between two coordinates.
///
/// Total and symmetric; `distance_km(p, p)` is zero up to floating-point error.
#[must_use]
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` marginally above 1 for antipodal points.
    let c = 2.0 * a.clamp(0.0, 1.0).sqrt().atan2((1.0 - a).clamp(0.0, 1.0).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_same_point() {
        let p = GeoPoint::new(37.5665, 126.9780);
        assert!(p.distance_km(&p).abs() < 1e-9);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let seoul = GeoPoint::new(37.5665, 126.9780);
        let busan = GeoPoint::new(35.1796, 129.0756);
        let there = seoul.distance_km(&busan);
        let back = busan.distance_km(&seoul);
        assert!((there - back).abs() < 1e-9);
    }

    #[test]
    fn test_distance_seoul_to_busan() {
        // Roughly 325 km as the crow flies
        let dist = distance_km(37.5665, 126.9780, 35.1796, 129.0756);
        assert!((dist - 325.0).abs() < 5.0, "got {dist}");
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let dist = distance_km(0.0, 0.0, 1.0, 0.0);
        assert!((dist - 111.19).abs() < 0.01, "got {dist}");
    }

    #[test]
    fn test_antipodal_points_do_not_produce_nan() {
        let dist = distance_km(0.0, 0.0, 0.0, 180.0);
        assert!(dist.is_finite());
        assert!((dist - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }
}
