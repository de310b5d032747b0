//! IQAir AirVisual adapter (premium ground network, includes weather).

use async_trait::async_trait;
use serde::Deserialize;

use super::{check_status, CurrentSource, ProviderError, ProviderResult, SourceReading};
use crate::models::{Pollutant, Weather};

const BASE_URL: &str = "https://api.airvisual.com/v2";

#[derive(Debug, Deserialize)]
struct NearestCityResponse {
    status: String,
    data: Option<CityData>,
}

#[derive(Debug, Deserialize)]
struct CityData {
    city: Option<String>,
    state: Option<String>,
    country: Option<String>,
    current: Option<Current>,
}

#[derive(Debug, Deserialize)]
struct Current {
    pollution: Option<Pollution>,
    weather: Option<IqWeather>,
}

#[derive(Debug, Deserialize)]
struct Pollution {
    aqius: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct IqWeather {
    tp: Option<f64>,
    hu: Option<f64>,
    pr: Option<f64>,
    ws: Option<f64>,
    wd: Option<f64>,
}

// ---

pub struct IqAirClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl IqAirClient {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }
}

fn to_source_reading(data: CityData) -> Option<SourceReading> {
    // ---
    let current = data.current?;
    let aqius = current.pollution.and_then(|p| p.aqius)?;

    // The US AQI IQAir reports is PM2.5-driven
    let pollutants = vec![Pollutant::new("PM2.5", aqius, "aqi")];

    let weather = current.weather.map(|w| Weather {
        temperature_c: w.tp,
        humidity_pct: w.hu,
        pressure_hpa: w.pr,
        wind_speed_ms: w.ws,
        wind_direction_deg: w.wd,
    });

    let station = [data.city.as_deref(), data.state.as_deref(), data.country.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ");

    Some(SourceReading {
        index: crate::aqi::clamp_index(aqius),
        pollutants,
        weather,
        station: (!station.is_empty()).then_some(station),
        city: data.city,
    })
}

#[async_trait]
impl CurrentSource for IqAirClient {
    fn name(&self) -> &str {
        "iqair"
    }

    async fn current(&self, lat: f64, lng: f64) -> ProviderResult<Option<SourceReading>> {
        // ---
        let api_key = self.api_key.as_ref().ok_or(ProviderError::NotConfigured)?;
        let url = format!("{}/nearest_city", self.base_url);

        tracing::debug!("IQAir: requesting nearest city for {}, {}", lat, lng);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lng.to_string()),
                ("key", api_key.clone()),
            ])
            .send()
            .await?;
        let body: NearestCityResponse = check_status(response).await?.json().await?;

        if body.status != "success" {
            tracing::warn!("IQAir returned non-success status: {}", body.status);
            return Ok(None);
        }

        Ok(body.data.and_then(to_source_reading))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_parse_nearest_city() {
        // ---
        let json = r#"{
            "status": "success",
            "data": {
                "city": "Delhi", "state": "Delhi", "country": "India",
                "current": {
                    "pollution": { "aqius": 168, "mainus": "p2" },
                    "weather": { "tp": 31, "hu": 40, "pr": 1008, "ws": 2.1, "wd": 270 }
                }
            }
        }"#;
        let body: NearestCityResponse = serde_json::from_str(json).unwrap();
        let reading = to_source_reading(body.data.unwrap()).unwrap();

        assert_eq!(reading.index, 168);
        assert_eq!(reading.city.as_deref(), Some("Delhi"));
        assert_eq!(reading.station.as_deref(), Some("Delhi, Delhi, India"));
        assert_eq!(reading.weather.unwrap().temperature_c, Some(31.0));
    }

    #[test]
    fn test_missing_pollution_is_none() {
        // ---
        let json = r#"{ "status": "success", "data": { "city": "X", "current": {} } }"#;
        let body: NearestCityResponse = serde_json::from_str(json).unwrap();
        assert!(to_source_reading(body.data.unwrap()).is_none());
    }
}
