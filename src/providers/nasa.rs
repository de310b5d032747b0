//! NASA POWER adapter: satellite aerosol optical depth (global coverage).
//!
//! No API key. Cloudy days come back as the fill value -999 and are skipped.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;

use super::{check_status, CurrentSource, HistorySource, ProviderResult, SourceReading};
use crate::aqi::aod_to_index;
use crate::models::{HistoricalPoint, HistoricalSource, Pollutant, PollutantLevels};

const BASE_URL: &str = "https://power.larc.nasa.gov/api/temporal/daily/point";
const PARAMETER: &str = "AOD_55";

/// How far back the current reading may reach for a cloud-free day.
const LOOKBACK_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
struct PowerResponse {
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct Properties {
    parameter: BTreeMap<String, BTreeMap<String, f64>>,
}

// ---

pub struct NasaPowerClient {
    client: reqwest::Client,
    base_url: String,
}

impl NasaPowerClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Valid AOD values keyed by date, ascending.
    async fn aod_series(
        &self,
        lat: f64,
        lng: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ProviderResult<Vec<(NaiveDate, f64)>> {
        // ---
        tracing::debug!("NASA POWER: requesting {} for {} .. {}", PARAMETER, start, end);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("parameters", PARAMETER.to_string()),
                ("community", "RE".to_string()),
                ("longitude", lng.to_string()),
                ("latitude", lat.to_string()),
                ("start", start.format("%Y%m%d").to_string()),
                ("end", end.format("%Y%m%d").to_string()),
                ("format", "JSON".to_string()),
            ])
            .send()
            .await?;
        let body: PowerResponse = check_status(response).await?.json().await?;

        Ok(parse_series(body))
    }
}

fn parse_series(body: PowerResponse) -> Vec<(NaiveDate, f64)> {
    let Some(values) = body.properties.parameter.get(PARAMETER) else {
        return Vec::new();
    };

    values
        .iter()
        .filter(|(_, aod)| **aod > 0.0)
        .filter_map(|(date, aod)| {
            NaiveDate::parse_from_str(date, "%Y%m%d")
                .ok()
                .map(|d| (d, *aod))
        })
        .collect()
}

fn reading_from_aod(aod: f64) -> SourceReading {
    SourceReading {
        index: aod_to_index(aod),
        pollutants: vec![
            // Rough column-to-surface estimate
            Pollutant::new("PM2.5", (aod * 100.0).round(), "µg/m³"),
            Pollutant::new("AOD", aod, "Aerosol Optical Depth"),
        ],
        weather: None,
        station: Some("NASA MODIS Satellite".to_string()),
        city: None,
    }
}

#[async_trait]
impl CurrentSource for NasaPowerClient {
    fn name(&self) -> &str {
        "nasa-power"
    }

    async fn current(&self, lat: f64, lng: f64) -> ProviderResult<Option<SourceReading>> {
        // ---
        let end = Utc::now().date_naive() - Duration::days(1);
        let start = end - Duration::days(LOOKBACK_DAYS);

        let series = self.aod_series(lat, lng, start, end).await?;
        let Some((date, aod)) = series.last().copied() else {
            tracing::warn!("NASA POWER: no cloud-free AOD in the last {} days", LOOKBACK_DAYS);
            return Ok(None);
        };

        tracing::debug!("NASA POWER: using AOD {} from {}", aod, date);
        Ok(Some(reading_from_aod(aod)))
    }
}

#[async_trait]
impl HistorySource for NasaPowerClient {
    fn name(&self) -> &str {
        "nasa-power"
    }

    async fn daily_history(
        &self,
        lat: f64,
        lng: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ProviderResult<Vec<HistoricalPoint>> {
        // ---
        let points: Vec<HistoricalPoint> = self
            .aod_series(lat, lng, start, end)
            .await?
            .into_iter()
            .map(|(date, aod)| {
                HistoricalPoint::new(
                    date,
                    aod_to_index(aod) as f64,
                    PollutantLevels::default(),
                    HistoricalSource::Satellite,
                    0.6,
                )
            })
            .collect();

        tracing::info!("NASA POWER: collected {} days of satellite data", points.len());
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_parse_series_skips_fill_values() {
        // ---
        let json = r#"{ "properties": { "parameter": { "AOD_55": {
            "20250501": 0.12, "20250502": -999.0, "20250503": 0.35
        } } } }"#;
        let body: PowerResponse = serde_json::from_str(json).unwrap();
        let series = parse_series(body);

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].0, NaiveDate::from_ymd_opt(2025, 5, 1).unwrap());
        assert_eq!(series[1].1, 0.35);
    }

    #[test]
    fn test_reading_from_aod() {
        // ---
        let reading = reading_from_aod(0.35);
        assert_eq!(reading.index, 150);
        assert_eq!(reading.pollutants[0].concentration, 35.0);
    }
}
