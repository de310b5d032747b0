//! WAQI (World Air Quality Index) adapter: community aggregator feed.
//!
//! The geo feed always answers with the closest station it knows about, so
//! the same call serves both the aggregator reading and the nearest-station
//! radius search.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    check_status, CurrentSource, NearbyStation, ProviderError, ProviderResult, SourceReading,
    StationSearch,
};
use crate::aqi::{clamp_index, unit_for};
use crate::geo::haversine_km;
use crate::models::Pollutant;

const BASE_URL: &str = "https://api.waqi.info";

/// `iaqi` keys that are weather, not pollutants.
const WEATHER_KEYS: [&str; 5] = ["h", "p", "t", "w", "wg"];

#[derive(Debug, Deserialize)]
struct FeedResponse {
    status: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct FeedData {
    aqi: serde_json::Value,
    city: Option<FeedCity>,
    #[serde(default)]
    iaqi: BTreeMap<String, IaqiValue>,
}

#[derive(Debug, Deserialize)]
struct FeedCity {
    name: Option<String>,
    #[serde(default)]
    geo: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct IaqiValue {
    v: f64,
}

/// Normalised feed: reading plus station coordinates when known.
#[derive(Debug)]
struct Feed {
    reading: SourceReading,
    station_coords: Option<(f64, f64)>,
}

// ---

pub struct WaqiClient {
    client: reqwest::Client,
    token: Option<String>,
    base_url: String,
}

impl WaqiClient {
    pub fn new(client: reqwest::Client, token: Option<String>) -> Self {
        Self {
            client,
            token,
            base_url: BASE_URL.to_string(),
        }
    }

    async fn feed(&self, lat: f64, lng: f64) -> ProviderResult<Option<Feed>> {
        // ---
        let token = self.token.as_ref().ok_or(ProviderError::NotConfigured)?;
        let url = format!("{}/feed/geo:{};{}/", self.base_url, lat, lng);

        tracing::debug!("WAQI: requesting {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("token", token.as_str())])
            .send()
            .await?;
        let body: FeedResponse = check_status(response).await?.json().await?;

        parse_feed(body)
    }
}

fn parse_feed(body: FeedResponse) -> ProviderResult<Option<Feed>> {
    // ---
    if body.status != "ok" {
        let detail = body.data.as_str().unwrap_or("unknown error").to_string();
        return Err(ProviderError::Api(format!("WAQI status {}: {}", body.status, detail)));
    }

    let data: FeedData = serde_json::from_value(body.data)?;

    // Stations without a current value report "-"
    let Some(aqi) = data.aqi.as_f64() else {
        return Ok(None);
    };

    let pollutants = data
        .iaqi
        .iter()
        .filter(|(key, _)| !WEATHER_KEYS.contains(&key.as_str()))
        .map(|(key, value)| Pollutant::new(key.to_uppercase(), value.v, unit_for(key)))
        .collect();

    let (name, station_coords) = match data.city {
        Some(city) => {
            let coords = match city.geo.as_slice() {
                [lat, lng, ..] => Some((*lat, *lng)),
                _ => None,
            };
            (city.name, coords)
        }
        None => (None, None),
    };

    Ok(Some(Feed {
        reading: SourceReading {
            index: clamp_index(aqi),
            pollutants,
            weather: None,
            station: name.clone(),
            city: name,
        },
        station_coords,
    }))
}

#[async_trait]
impl CurrentSource for WaqiClient {
    fn name(&self) -> &str {
        "waqi"
    }

    async fn current(&self, lat: f64, lng: f64) -> ProviderResult<Option<SourceReading>> {
        Ok(self.feed(lat, lng).await?.map(|feed| feed.reading))
    }
}

#[async_trait]
impl StationSearch for WaqiClient {
    fn name(&self) -> &str {
        "waqi"
    }

    async fn nearest(
        &self,
        lat: f64,
        lng: f64,
        max_radius_km: f64,
    ) -> ProviderResult<Option<NearbyStation>> {
        // ---
        let Some(feed) = self.feed(lat, lng).await? else {
            return Ok(None);
        };
        let Some((s_lat, s_lng)) = feed.station_coords else {
            return Ok(None);
        };

        let distance_km = haversine_km(lat, lng, s_lat, s_lng);
        if distance_km > max_radius_km {
            tracing::debug!(
                "WAQI: nearest station {:.1}km away exceeds {}km",
                distance_km,
                max_radius_km
            );
            return Ok(None);
        }

        Ok(Some(NearbyStation {
            reading: feed.reading,
            distance_km,
        }))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_parse_feed_filters_weather_keys() {
        // ---
        let json = r#"{ "status": "ok", "data": {
            "aqi": 87,
            "city": { "name": "Shanghai", "geo": [31.23, 121.47] },
            "iaqi": { "pm25": { "v": 87 }, "co": { "v": 6.4 }, "t": { "v": 21 }, "h": { "v": 60 } }
        } }"#;
        let body: FeedResponse = serde_json::from_str(json).unwrap();
        let feed = parse_feed(body).unwrap().unwrap();

        assert_eq!(feed.reading.index, 87);
        assert_eq!(feed.reading.pollutants.len(), 2);
        assert_eq!(feed.reading.pollutants[0].name, "CO");
        assert_eq!(feed.reading.pollutants[0].unit, "mg/m³");
        assert_eq!(feed.station_coords, Some((31.23, 121.47)));
    }

    #[test]
    fn test_parse_feed_without_value() {
        // ---
        let json = r#"{ "status": "ok", "data": { "aqi": "-", "iaqi": {} } }"#;
        let body: FeedResponse = serde_json::from_str(json).unwrap();
        assert!(parse_feed(body).unwrap().is_none());
    }

    #[test]
    fn test_parse_feed_error_status() {
        // ---
        let json = r#"{ "status": "error", "data": "Invalid key" }"#;
        let body: FeedResponse = serde_json::from_str(json).unwrap();
        let err = parse_feed(body).unwrap_err();
        assert!(err.to_string().contains("Invalid key"));
    }
}
