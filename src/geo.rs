//! Distance and coordinate helpers.
//!
//! Pure functions only. Everything that needs "how far is that station" or
//! "which cache bucket does this point fall into" goes through here.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

// ---

pub fn to_radians(degrees: f64) -> f64 {
    degrees * std::f64::consts::PI / 180.0
}

pub fn to_degrees(radians: f64) -> f64 {
    radians * 180.0 / std::f64::consts::PI
}

/// Great-circle distance between two points in kilometres (Haversine).
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    // ---
    let d_lat = to_radians(lat2 - lat1);
    let d_lng = to_radians(lng2 - lng1);

    let a = (d_lat / 2.0).sin().powi(2)
        + to_radians(lat1).cos() * to_radians(lat2).cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Round a coordinate to two decimals (~1.1 km at the equator).
pub fn round_coord(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Human readable fallback label used when reverse geocoding fails.
pub fn coordinate_label(lat: f64, lng: f64) -> String {
    format!("Location at {:.2}°, {:.2}°", lat, lng)
}

/// Cache / model-registry key for a location, built from 2-decimal rounded
/// coordinates. Two points inside the same ~1 km cell share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationKey(String);

impl LocationKey {
    // ---
    pub fn new(lat: f64, lng: f64) -> Self {
        // Normalise -0.00 so both sides of the meridian/equator hash the same
        let lat = round_coord(lat) + 0.0;
        let lng = round_coord(lng) + 0.0;
        Self(format!("{:.2}_{:.2}", lat, lng))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_degree_radian_conversion() {
        // ---
        assert!((to_radians(180.0) - std::f64::consts::PI).abs() < 1e-12);
        assert!((to_degrees(std::f64::consts::PI / 2.0) - 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_haversine_known_distance() {
        // ---
        // Paris -> London is roughly 344 km
        let d = haversine_km(48.8566, 2.3522, 51.5074, -0.1278);
        assert!((d - 343.5).abs() < 2.0, "got {d}");

        // Same point
        assert_eq!(haversine_km(10.0, 10.0, 10.0, 10.0), 0.0);
    }

    #[test]
    fn test_haversine_is_symmetric() {
        // ---
        let a = haversine_km(28.61, 77.21, 19.07, 72.88);
        let b = haversine_km(19.07, 72.88, 28.61, 77.21);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn test_location_key_rounding() {
        // ---
        assert_eq!(LocationKey::new(28.6139, 77.2090).as_str(), "28.61_77.21");
        assert_eq!(LocationKey::new(28.6141, 77.2088), LocationKey::new(28.6139, 77.2090));
        assert_eq!(LocationKey::new(-0.001, 0.001).as_str(), "0.00_0.00");
    }

    #[test]
    fn test_coordinate_label() {
        // ---
        assert_eq!(coordinate_label(1.234, -5.678), "Location at 1.23°, -5.68°");
    }
}
