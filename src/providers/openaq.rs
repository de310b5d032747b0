//! OpenAQ v3 adapter: government ground stations, live and daily history.
//!
//! OpenAQ uses geographic coordinates with a radius search (25 km max) to find
//! stations. Latest values are keyed by sensor id, so every lookup first maps
//! the location's sensors to parameter names.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::future::join_all;
use serde::Deserialize;

use super::{
    check_status, GroundNetwork, GroundStation, HistorySource, Measurement, ProviderError,
    ProviderResult,
};
use crate::aqi::pm25_to_index;
use crate::geo::haversine_km;
use crate::models::{HistoricalPoint, HistoricalSource, PollutantKey, PollutantLevels};

const BASE_URL: &str = "https://api.openaq.org/v3";
const MAX_RADIUS_M: f64 = 25_000.0;

/// Observations per day needed for a full-confidence daily mean.
const FULL_COVERAGE_OBSERVATIONS: u32 = 12;

#[derive(Debug, Deserialize)]
struct Page<T> {
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Coordinates {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Parameter {
    name: String,
    units: String,
}

#[derive(Debug, Deserialize)]
struct Sensor {
    id: i64,
    parameter: Parameter,
}

#[derive(Debug, Deserialize)]
struct Location {
    id: i64,
    name: Option<String>,
    coordinates: Coordinates,
    #[serde(default)]
    sensors: Vec<Sensor>,
}

#[derive(Debug, Deserialize)]
struct Datetime {
    utc: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Latest {
    datetime: Option<Datetime>,
    value: f64,
    sensors_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Period {
    datetime_from: Datetime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Coverage {
    observed_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct DailyValue {
    value: f64,
    period: Period,
    coverage: Option<Coverage>,
}

/// One sensor's mean for one day.
#[derive(Debug, Clone, PartialEq)]
struct DailyEntry {
    key: PollutantKey,
    date: NaiveDate,
    value: f64,
    observations: u32,
}

// ---

pub struct OpenAqClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAqClient {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ProviderResult<T> {
        // ---
        let api_key = self.api_key.as_ref().ok_or(ProviderError::NotConfigured)?;
        let url = format!("{}{}", self.base_url, path);

        tracing::debug!("OpenAQ: requesting {}", url);

        let response = self
            .client
            .get(&url)
            .header("X-API-Key", api_key)
            .query(query)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn locations(&self, lat: f64, lng: f64, radius_km: f64, limit: u32) -> ProviderResult<Vec<Location>> {
        let radius_m = (radius_km * 1000.0).clamp(1000.0, MAX_RADIUS_M).round() as u32;
        let page: Page<Location> = self
            .get(
                "/locations",
                &[
                    ("coordinates", format!("{},{}", lat, lng)),
                    ("radius", radius_m.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(page.results)
    }

    async fn station(&self, lat: f64, lng: f64, location: &Location) -> ProviderResult<GroundStation> {
        // ---
        let page: Page<Latest> = self
            .get(&format!("/locations/{}/latest", location.id), &[])
            .await?;

        let params: HashMap<i64, &Parameter> =
            location.sensors.iter().map(|s| (s.id, &s.parameter)).collect();

        let measurements = page
            .results
            .into_iter()
            .filter_map(|latest| {
                let parameter = params.get(&latest.sensors_id)?;
                Some(Measurement {
                    parameter: parameter.name.to_lowercase(),
                    value: latest.value,
                    unit: parameter.units.clone(),
                    timestamp: latest.datetime.map(|d| d.utc),
                })
            })
            .collect();

        let distance_km = match (location.coordinates.latitude, location.coordinates.longitude) {
            (Some(s_lat), Some(s_lng)) => haversine_km(lat, lng, s_lat, s_lng),
            _ => return Err(ProviderError::InvalidData("station without coordinates".into())),
        };

        Ok(GroundStation {
            id: location.id.to_string(),
            name: location.name.clone().unwrap_or_else(|| format!("Station {}", location.id)),
            distance_km,
            measurements,
        })
    }

    async fn sensor_days(
        &self,
        sensor: &Sensor,
        key: PollutantKey,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ProviderResult<Vec<DailyEntry>> {
        // ---
        let page: Page<DailyValue> = self
            .get(
                &format!("/sensors/{}/days", sensor.id),
                &[
                    ("datetime_from", start.to_string()),
                    ("datetime_to", (end + Duration::days(1)).to_string()),
                    ("limit", "1000".to_string()),
                ],
            )
            .await?;

        Ok(page
            .results
            .into_iter()
            .map(|d| DailyEntry {
                key,
                date: d.period.datetime_from.utc.date_naive(),
                value: d.value,
                observations: d.coverage.and_then(|c| c.observed_count).unwrap_or(0),
            })
            .collect())
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Fold per-sensor daily means into one point per date.
///
/// Days without a PM2.5 mean are dropped; the index is derived from it.
fn aggregate_daily(entries: Vec<DailyEntry>) -> Vec<HistoricalPoint> {
    // ---
    let mut by_date: BTreeMap<NaiveDate, HashMap<PollutantKey, (f64, u32, u32)>> = BTreeMap::new();

    for entry in entries {
        let slot = by_date
            .entry(entry.date)
            .or_default()
            .entry(entry.key)
            .or_insert((0.0, 0, 0));
        slot.0 += entry.value;
        slot.1 += 1;
        slot.2 += entry.observations;
    }

    by_date
        .into_iter()
        .filter_map(|(date, values)| {
            let mut levels = PollutantLevels::default();
            for (key, (sum, count, _)) in &values {
                levels.set(*key, round1(sum / *count as f64));
            }

            let (_, _, pm25_observations) = values.get(&PollutantKey::Pm25)?;
            let confidence = if *pm25_observations >= FULL_COVERAGE_OBSERVATIONS {
                1.0
            } else {
                0.7
            };

            Some(HistoricalPoint::new(
                date,
                pm25_to_index(levels.pm25) as f64,
                levels,
                HistoricalSource::Ground,
                confidence,
            ))
        })
        .collect()
}

#[async_trait]
impl GroundNetwork for OpenAqClient {
    fn name(&self) -> &str {
        "openaq"
    }

    async fn stations(&self, lat: f64, lng: f64, radius_km: f64) -> ProviderResult<Vec<GroundStation>> {
        // ---
        let locations = self.locations(lat, lng, radius_km, 10).await?;

        let lookups = locations.iter().map(|loc| self.station(lat, lng, loc));
        let mut stations: Vec<GroundStation> = join_all(lookups)
            .await
            .into_iter()
            .filter_map(|result| match result {
                Ok(station) if !station.measurements.is_empty() => Some(station),
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!("OpenAQ: skipping station: {}", e);
                    None
                }
            })
            .collect();

        stations.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        Ok(stations)
    }
}

#[async_trait]
impl HistorySource for OpenAqClient {
    fn name(&self) -> &str {
        "openaq"
    }

    async fn daily_history(
        &self,
        lat: f64,
        lng: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ProviderResult<Vec<HistoricalPoint>> {
        // ---
        let locations = self.locations(lat, lng, MAX_RADIUS_M / 1000.0, 1).await?;
        let Some(location) = locations.first() else {
            tracing::info!("OpenAQ: no stations near {:.2}, {:.2}", lat, lng);
            return Ok(Vec::new());
        };

        tracing::debug!("OpenAQ: history from station {:?} ({})", location.name, location.id);

        let fetches = location.sensors.iter().filter_map(|sensor| {
            let key = PollutantKey::parse(&sensor.parameter.name)?;
            Some(self.sensor_days(sensor, key, start, end))
        });

        let mut entries = Vec::new();
        for result in join_all(fetches).await {
            match result {
                Ok(days) => entries.extend(days),
                Err(e) => tracing::debug!("OpenAQ: sensor history failed: {}", e),
            }
        }

        let points = aggregate_daily(entries);
        tracing::info!("OpenAQ: collected {} days of ground data", points.len());
        Ok(points)
    }
}
