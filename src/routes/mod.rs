//! HTTP surface over [`AirQualityService`] (EMBP gateway).
//!
//! Each sibling module owns one group of endpoints and exports a subrouter;
//! this gateway merges them and attaches the shared service as state.

use std::sync::Arc;

use axum::Router;

use crate::service::AirQualityService;

mod analytics;
mod current;
mod error;
mod forecast;
mod health;
mod history;

pub use error::ApiError;

pub type AppState = Arc<AirQualityService>;

// ---

pub fn router(service: AppState) -> Router {
    // ---
    Router::new()
        .merge(current::router())
        .merge(history::router())
        .merge(analytics::router())
        .merge(forecast::router())
        .merge(health::router())
        .with_state(service)
}

/// Reject coordinates outside the globe.
fn check_point(lat: f64, lng: f64) -> Result<(), ApiError> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(ApiError::BadRequest(format!(
            "coordinates out of range: lat {}, lng {}",
            lat, lng
        )));
    }
    Ok(())
}

/// `days` or its default, bounded to `1..=max`.
fn check_days(days: Option<u32>, default: u32, max: u32) -> Result<u32, ApiError> {
    let days = days.unwrap_or(default);
    if days == 0 || days > max {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {}, got {}",
            max, days
        )));
    }
    Ok(days)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_check_point_bounds() {
        // ---
        assert!(check_point(28.6, 77.2).is_ok());
        assert!(check_point(90.0, -180.0).is_ok());
        assert!(check_point(91.0, 0.0).is_err());
        assert!(check_point(0.0, 181.0).is_err());
    }

    #[test]
    fn test_check_days_defaults_and_bounds() {
        // ---
        assert_eq!(check_days(None, 30, 365).unwrap(), 30);
        assert_eq!(check_days(Some(365), 30, 365).unwrap(), 365);
        assert!(check_days(Some(0), 30, 365).is_err());
        assert!(check_days(Some(400), 30, 365).is_err());
    }
}
