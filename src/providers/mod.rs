//! Provider adapter interfaces and their HTTP implementations.
//!
//! The engines only ever see the traits declared here and the normalised
//! types they return. Each sibling module wraps one upstream API and is the
//! only place that knows its response shape (EMBP: children are private,
//! this gateway re-exports the adapters).
//!
//! Adapters report failure through [`ProviderError`]; "nothing here" is an
//! `Ok(None)` / empty `Vec`, not an error.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{HistoricalPoint, Pollutant, Weather};

mod iqair;
mod nasa;
mod nominatim;
mod openaq;
mod waqi;

pub use iqair::IqAirClient;
pub use nasa::NasaPowerClient;
pub use nominatim::NominatimClient;
pub use openaq::OpenAqClient;
pub use waqi::WaqiClient;

// ---

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("API key not configured")]
    NotConfigured,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Current conditions as reported by one provider, already on the index scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReading {
    pub index: u16,
    pub pollutants: Vec<Pollutant>,
    pub weather: Option<Weather>,
    /// Station or feed name, when the provider exposes one.
    pub station: Option<String>,
    /// City name resolved by the provider itself.
    pub city: Option<String>,
}

/// One raw measurement at a ground station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub parameter: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A government monitoring station near the query point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundStation {
    pub id: String,
    pub name: String,
    pub distance_km: f64,
    pub measurements: Vec<Measurement>,
}

impl GroundStation {
    pub fn measurement(&self, parameter: &str) -> Option<f64> {
        self.measurements
            .iter()
            .find(|m| m.parameter.eq_ignore_ascii_case(parameter))
            .map(|m| m.value)
    }
}

/// Closest station found by a radius search.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyStation {
    pub reading: SourceReading,
    pub distance_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub city: String,
    pub country: String,
    pub lat: f64,
    pub lng: f64,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceName {
    pub city: String,
    pub country: String,
}

/// A provider that reports current conditions at a point.
#[async_trait]
pub trait CurrentSource: Send + Sync {
    fn name(&self) -> &str;

    async fn current(&self, lat: f64, lng: f64) -> ProviderResult<Option<SourceReading>>;
}

/// A network of ground stations queried by radius.
#[async_trait]
pub trait GroundNetwork: Send + Sync {
    fn name(&self) -> &str;

    /// Stations within `radius_km`, nearest first.
    async fn stations(&self, lat: f64, lng: f64, radius_km: f64) -> ProviderResult<Vec<GroundStation>>;
}

/// Nearest-station lookup used for hybrid enhancement and the fallback search.
#[async_trait]
pub trait StationSearch: Send + Sync {
    fn name(&self) -> &str;

    async fn nearest(
        &self,
        lat: f64,
        lng: f64,
        max_radius_km: f64,
    ) -> ProviderResult<Option<NearbyStation>>;
}

/// Daily-aggregated history for a point, one entry per day with data.
#[async_trait]
pub trait HistorySource: Send + Sync {
    fn name(&self) -> &str;

    async fn daily_history(
        &self,
        lat: f64,
        lng: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ProviderResult<Vec<HistoricalPoint>>;
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn forward(&self, query: &str) -> ProviderResult<GeocodeResult>;

    async fn reverse(&self, lat: f64, lng: f64) -> ProviderResult<PlaceName>;
}

/// Run one provider call under a deadline.
pub async fn bounded<T, F>(timeout: Duration, fut: F) -> ProviderResult<T>
where
    F: Future<Output = ProviderResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(timeout)),
    }
}

/// Shared HTTP client for the adapters.
pub fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("airfusion/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Map a non-success HTTP status into an API error with the response body.
async fn check_status(response: reqwest::Response) -> ProviderResult<reqwest::Response> {
    // ---
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let reason = match status.as_u16() {
        429 => "rate limit exceeded".to_string(),
        404 => "no data for this location".to_string(),
        _ => format!("status {}: {}", status, body),
    };
    Err(ProviderError::Api(reason))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[tokio::test]
    async fn test_bounded_times_out() {
        // ---
        let result: ProviderResult<u32> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(1)
        })
        .await;
        assert!(matches!(result, Err(ProviderError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        // ---
        let result = bounded(Duration::from_secs(1), async { Ok::<_, ProviderError>(5) }).await;
        let value = tokio_test::assert_ok!(result);
        assert_eq!(value, 5);
    }

    #[test]
    fn test_station_measurement_lookup() {
        // ---
        let station = GroundStation {
            id: "1".into(),
            name: "Anand Vihar".into(),
            distance_km: 3.2,
            measurements: vec![Measurement {
                parameter: "PM25".into(),
                value: 61.0,
                unit: "µg/m³".into(),
                timestamp: None,
            }],
        };
        assert_eq!(station.measurement("pm25"), Some(61.0));
        assert_eq!(station.measurement("pm10"), None);
    }
}
