//! Nominatim (OpenStreetMap) geocoder. Free, no key, requires a User-Agent.

use async_trait::async_trait;
use serde::Deserialize;

use super::{check_status, GeocodeResult, Geocoder, PlaceName, ProviderError, ProviderResult};

const BASE_URL: &str = "https://nominatim.openstreetmap.org";

#[derive(Debug, Default, Deserialize)]
struct Address {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    county: Option<String>,
    country: Option<String>,
}

impl Address {
    fn place(&self) -> Option<String> {
        self.city
            .clone()
            .or_else(|| self.town.clone())
            .or_else(|| self.village.clone())
            .or_else(|| self.county.clone())
    }
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    display_name: String,
    #[serde(default)]
    address: Address,
}

#[derive(Debug, Deserialize)]
struct ReverseHit {
    #[serde(default)]
    address: Address,
}

// ---

pub struct NominatimClient {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: BASE_URL.to_string(),
        }
    }
}

fn to_geocode(hit: SearchHit) -> ProviderResult<GeocodeResult> {
    // ---
    let lat = hit
        .lat
        .parse::<f64>()
        .map_err(|e| ProviderError::InvalidData(format!("latitude '{}': {}", hit.lat, e)))?;
    let lng = hit
        .lon
        .parse::<f64>()
        .map_err(|e| ProviderError::InvalidData(format!("longitude '{}': {}", hit.lon, e)))?;

    Ok(GeocodeResult {
        city: hit.address.place().unwrap_or_else(|| "Unknown".to_string()),
        country: hit.address.country.clone().unwrap_or_else(|| "Unknown".to_string()),
        lat,
        lng,
        display_name: hit.display_name,
    })
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn forward(&self, query: &str) -> ProviderResult<GeocodeResult> {
        // ---
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("q", query),
                ("format", "json"),
                ("limit", "1"),
                ("addressdetails", "1"),
            ])
            .send()
            .await?;
        let hits: Vec<SearchHit> = check_status(response).await?.json().await?;

        let hit = hits.into_iter().next().ok_or_else(|| {
            ProviderError::Api(format!(
                "Location \"{}\" not found. Please try a different search.",
                query
            ))
        })?;
        to_geocode(hit)
    }

    async fn reverse(&self, lat: f64, lng: f64) -> ProviderResult<PlaceName> {
        // ---
        let response = self
            .client
            .get(format!("{}/reverse", self.base_url))
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lng.to_string()),
                ("format", "json".to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .send()
            .await?;
        let hit: ReverseHit = check_status(response).await?.json().await?;

        Ok(PlaceName {
            city: hit.address.place().unwrap_or_else(|| "Unknown Location".to_string()),
            country: hit.address.country.unwrap_or_else(|| "Unknown".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_search_hit_prefers_city_then_town() {
        // ---
        let json = r#"[{ "lat": "48.8566", "lon": "2.3522", "display_name": "Paris, France",
                        "address": { "town": "Paris", "country": "France" } }]"#;
        let hits: Vec<SearchHit> = serde_json::from_str(json).unwrap();
        let result = to_geocode(hits.into_iter().next().unwrap()).unwrap();

        assert_eq!(result.city, "Paris");
        assert_eq!(result.country, "France");
        assert!((result.lat - 48.8566).abs() < 1e-9);
    }

    #[test]
    fn test_bad_coordinate_is_invalid_data() {
        // ---
        let hit = SearchHit {
            lat: "north".into(),
            lon: "0".into(),
            display_name: String::new(),
            address: Address::default(),
        };
        assert!(matches!(to_geocode(hit), Err(ProviderError::InvalidData(_))));
    }
}
