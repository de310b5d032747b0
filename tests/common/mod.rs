//! In-process provider adapters with canned answers.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use airfusion::providers::{
    CurrentSource, GeocodeResult, Geocoder, GroundNetwork, GroundStation, HistorySource,
    Measurement, NearbyStation, PlaceName, ProviderError, ProviderResult, SourceReading,
    StationSearch,
};
use airfusion::{
    Adapters, AirQualityService, FusionSources, HistoricalPoint, HistoricalSource, MemoryCache,
    PollutantLevels, ServiceSettings, TrainingConfig,
};

pub fn source_reading(index: u16) -> SourceReading {
    SourceReading {
        index,
        pollutants: vec![airfusion::Pollutant::new("PM25", index as f64 / 4.0, "µg/m³")],
        weather: None,
        station: Some(format!("station-{index}")),
        city: None,
    }
}

// ---

pub struct FixedCurrent {
    pub name: &'static str,
    pub reading: Option<SourceReading>,
    pub fail: bool,
}

impl FixedCurrent {
    pub fn ok(name: &'static str, index: u16) -> Arc<Self> {
        Arc::new(Self {
            name,
            reading: Some(source_reading(index)),
            fail: false,
        })
    }

    pub fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            reading: None,
            fail: true,
        })
    }
}

#[async_trait]
impl CurrentSource for FixedCurrent {
    fn name(&self) -> &str {
        self.name
    }

    async fn current(&self, _lat: f64, _lng: f64) -> ProviderResult<Option<SourceReading>> {
        if self.fail {
            return Err(ProviderError::Api("service unavailable".into()));
        }
        Ok(self.reading.clone())
    }
}

pub struct FixedStations(pub Vec<GroundStation>);

impl FixedStations {
    pub fn pm25(value: f64) -> Arc<Self> {
        Arc::new(Self(vec![GroundStation {
            id: "ground-1".into(),
            name: "Ground Station".into(),
            distance_km: 3.0,
            measurements: vec![Measurement {
                parameter: "pm25".into(),
                value,
                unit: "µg/m³".into(),
                timestamp: None,
            }],
        }]))
    }
}

#[async_trait]
impl GroundNetwork for FixedStations {
    fn name(&self) -> &str {
        "fixed-ground"
    }

    async fn stations(&self, _lat: f64, _lng: f64, _radius_km: f64) -> ProviderResult<Vec<GroundStation>> {
        Ok(self.0.clone())
    }
}

/// One station at a fixed distance; invisible beyond the search radius.
pub struct FixedNearest {
    pub index: u16,
    pub distance_km: f64,
}

#[async_trait]
impl StationSearch for FixedNearest {
    fn name(&self) -> &str {
        "fixed-nearest"
    }

    async fn nearest(
        &self,
        _lat: f64,
        _lng: f64,
        max_radius_km: f64,
    ) -> ProviderResult<Option<NearbyStation>> {
        if self.distance_km > max_radius_km {
            return Ok(None);
        }
        Ok(Some(NearbyStation {
            reading: source_reading(self.index),
            distance_km: self.distance_km,
        }))
    }
}

pub struct FixedHistory(pub Vec<HistoricalPoint>);

#[async_trait]
impl HistorySource for FixedHistory {
    fn name(&self) -> &str {
        "fixed-history"
    }

    async fn daily_history(
        &self,
        _lat: f64,
        _lng: f64,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> ProviderResult<Vec<HistoricalPoint>> {
        Ok(self.0.clone())
    }
}

pub struct FixedGeocoder;

#[async_trait]
impl Geocoder for FixedGeocoder {
    async fn forward(&self, query: &str) -> ProviderResult<GeocodeResult> {
        if query.eq_ignore_ascii_case("delhi") {
            return Ok(GeocodeResult {
                city: "Delhi".into(),
                country: "India".into(),
                lat: 28.61,
                lng: 77.21,
                display_name: "Delhi, India".into(),
            });
        }
        Err(ProviderError::Api(format!("no match for {query}")))
    }

    async fn reverse(&self, _lat: f64, _lng: f64) -> ProviderResult<PlaceName> {
        Ok(PlaceName {
            city: "Delhi".into(),
            country: "India".into(),
        })
    }
}

// ---

pub fn ground_point(date: NaiveDate, index: f64) -> HistoricalPoint {
    let levels = PollutantLevels {
        pm25: index / 2.0,
        pm10: index * 0.7,
        ..PollutantLevels::default()
    };
    HistoricalPoint::new(date, index, levels, HistoricalSource::Ground, 1.0)
}

/// `days` daily points ending on `end` with a weekly swing.
pub fn daily_series(end: NaiveDate, days: i64) -> Vec<HistoricalPoint> {
    (0..days)
        .map(|i| {
            let date = end - chrono::Duration::days(days - 1 - i);
            ground_point(date, 70.0 + 15.0 * (i as f64 / 3.0).sin())
        })
        .collect()
}

pub fn settings() -> ServiceSettings {
    ServiceSettings {
        provider_timeout: Duration::from_secs(2),
        history_days: 60,
        training: TrainingConfig {
            epochs: 5,
            ..TrainingConfig::default()
        },
        ..ServiceSettings::default()
    }
}

pub fn service(adapters: Adapters) -> AirQualityService {
    AirQualityService::new(adapters, Arc::new(MemoryCache::new()), settings())
}

/// Every source reporting: premium, ground, satellite and aggregator.
pub fn all_sources() -> FusionSources {
    FusionSources {
        premium: Some(FixedCurrent::ok("premium", 42)),
        ground: Some(FixedStations::pm25(20.0)),
        satellite: Some(FixedCurrent::ok("satellite", 150)),
        aggregator: Some(FixedCurrent::ok("aggregator", 77)),
        station_search: Some(Arc::new(FixedNearest {
            index: 64,
            distance_km: 12.0,
        })),
        geocoder: Some(Arc::new(FixedGeocoder)),
    }
}
