//! Public facade over the fusion, history, analytics and forecast engines.
//!
//! Callers go through [`AirQualityService`]; the engines never see each
//! other. The collected [`Dataset`] is the only input analytics and
//! forecasting receive.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use crate::analytics::{self, MonthlyAnalysis, PollutantTrend, QuickSummary, YearlyAnalysis};
use crate::cache::CacheStore;
use crate::error::{AirQualityError, Result};
use crate::forecast::{ForecastEngine, ForecastResult, ProgressCallback, TrainingConfig};
use crate::fusion::{FusionEngine, FusionSources};
use crate::history::HistoricalCollector;
use crate::models::{Dataset, HistoricalPoint, PollutantKey, Reading};
use crate::providers::{bounded, HistorySource};

/// Every adapter the service can draw on. Any of them may be absent.
#[derive(Clone, Default)]
pub struct Adapters {
    pub fusion: FusionSources,
    pub ground_history: Option<Arc<dyn HistorySource>>,
    pub satellite_history: Option<Arc<dyn HistorySource>>,
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub provider_timeout: Duration,
    pub cache_ttl: chrono::Duration,
    /// Days of history collected to train a forecaster.
    pub history_days: u32,
    pub training: TrainingConfig,
    pub registry_capacity: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(15),
            cache_ttl: chrono::Duration::hours(24),
            history_days: 180,
            training: TrainingConfig::default(),
            registry_capacity: 64,
        }
    }
}

pub struct AirQualityService {
    adapters: Adapters,
    fusion: FusionEngine,
    history: HistoricalCollector,
    forecast: ForecastEngine,
    settings: ServiceSettings,
}

impl AirQualityService {
    // ---
    pub fn new(adapters: Adapters, cache: Arc<dyn CacheStore>, settings: ServiceSettings) -> Self {
        // ---
        let fusion = FusionEngine::new(adapters.fusion.clone(), settings.provider_timeout);
        let history = HistoricalCollector::new(
            adapters.ground_history.clone(),
            adapters.satellite_history.clone(),
            cache,
            settings.cache_ttl,
            settings.provider_timeout,
        );
        let forecast = ForecastEngine::new(settings.training.clone(), settings.registry_capacity);

        Self {
            adapters,
            fusion,
            history,
            forecast,
            settings,
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Best available reading for a point; `NoDataAvailable` when nothing
    /// reports within 100 km.
    pub async fn get_current_reading(
        &self,
        lat: f64,
        lng: f64,
        city_hint: Option<&str>,
    ) -> Result<Reading> {
        self.fusion.fuse(lat, lng, city_hint).await
    }

    /// Resolve a place name, then fuse a reading for it.
    pub async fn search_reading(&self, query: &str) -> Result<Reading> {
        // ---
        let geocoder = self
            .adapters
            .fusion
            .geocoder
            .as_deref()
            .ok_or_else(|| AirQualityError::LocationNotFound("geocoding is not configured".into()))?;

        let place = bounded(self.settings.provider_timeout, geocoder.forward(query))
            .await
            .map_err(|e| {
                tracing::warn!("geocoding '{}' failed: {}", query, e);
                AirQualityError::LocationNotFound(format!(
                    "Location \"{}\" not found. Please try a different search.",
                    query
                ))
            })?;

        tracing::info!("resolved '{}' to {} ({:.4}, {:.4})", query, place.display_name, place.lat, place.lng);

        let mut reading = self.fusion.fuse(place.lat, place.lng, Some(&place.city)).await?;
        reading.location.country = place.country;
        Ok(reading)
    }

    pub async fn get_historical_dataset(
        &self,
        lat: f64,
        lng: f64,
        days: u32,
        city_hint: Option<&str>,
        country_hint: Option<&str>,
    ) -> Dataset {
        self.history
            .collect(lat, lng, days, city_hint, country_hint)
            .await
    }

    pub fn weekly_analysis(&self, dataset: &Dataset) -> Vec<HistoricalPoint> {
        analytics::weekly(&dataset.points, dataset.end_date)
    }

    /// Weekly view ending on an arbitrary date.
    pub fn weekly_analysis_until(&self, dataset: &Dataset, end: NaiveDate) -> Vec<HistoricalPoint> {
        analytics::weekly(&dataset.points, end)
    }

    pub fn monthly_analysis(&self, dataset: &Dataset) -> Result<Vec<MonthlyAnalysis>> {
        analytics::monthly(&dataset.points)
    }

    pub fn yearly_analysis(&self, dataset: &Dataset) -> Result<Vec<YearlyAnalysis>> {
        analytics::yearly(&dataset.points)
    }

    pub fn pollutant_trend(&self, dataset: &Dataset, key: PollutantKey) -> Result<PollutantTrend> {
        analytics::pollutant_trend(&dataset.points, key)
    }

    pub fn pollutant_trends(&self, dataset: &Dataset) -> Result<Vec<PollutantTrend>> {
        analytics::pollutant_trends(&dataset.points)
    }

    pub fn quick_summary(&self, dataset: &Dataset) -> Result<QuickSummary> {
        analytics::quick_summary(&dataset.points)
    }

    /// Forecast `days` days for a point, collecting training history first.
    ///
    /// Never fails: the trained path degrades to the statistical forecaster.
    pub async fn get_forecast(
        &self,
        lat: f64,
        lng: f64,
        current: &Reading,
        days: u32,
        use_trained_model: bool,
        on_progress: Option<ProgressCallback>,
    ) -> ForecastResult {
        // ---
        let dataset = if use_trained_model {
            self.history
                .collect(
                    lat,
                    lng,
                    self.settings.history_days,
                    Some(&current.location.city),
                    Some(&current.location.country),
                )
                .await
        } else {
            Dataset {
                location: current.location.clone(),
                points: Vec::new(),
                start_date: current.timestamp.date_naive(),
                end_date: current.timestamp.date_naive(),
                total_points: 0,
                completeness: 0.0,
            }
        };

        self.forecast
            .forecast(&dataset, current.index, days, use_trained_model, on_progress)
            .await
    }
}
