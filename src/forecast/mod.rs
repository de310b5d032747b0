//! Forecast engine (EMBP gateway).
//!
//! Two forecasters behind one result contract:
//! - `sequence`: echo state network trained per location, walked forward
//!   one day at a time
//! - `statistical`: trend and season heuristic over the current index
//!
//! Trained models live in a bounded [`ModelRegistry`] keyed by location.
//! Any failure on the trained path (short history, training error, bad
//! prediction) falls back to the statistical forecaster; callers always get
//! predictions.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::analytics::classify_trend;
use crate::aqi::{clamp_index, MAX_INDEX};
use crate::error::{AirQualityError, Result};
use crate::geo::LocationKey;
use crate::models::{Dataset, HistoricalPoint, Prediction, Trend};

mod registry;
mod sequence;
mod statistical;

pub use registry::{ModelRegistry, TrainedModel};
pub use sequence::{SequenceModel, TrainingConfig};

/// Fewest history days the trained path will attempt.
pub const MIN_FORECAST_DAYS: usize = 3;

/// Dataset days inspected for the first trained prediction's trend label.
const TREND_LOOKBACK_DAYS: usize = 30;

/// Accuracy reported for the statistical forecaster.
const STATISTICAL_ACCURACY: f64 = 75.0;

// ---

/// One epoch's progress while training.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrainingProgress {
    /// 1-based.
    pub epoch: usize,
    pub total_epochs: usize,
    pub loss: f64,
    pub val_loss: f64,
    /// `100 - validation MAE%`.
    pub accuracy: f64,
}

pub type ProgressCallback = Arc<dyn Fn(TrainingProgress) + Send + Sync>;

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub algorithm: String,
    pub training: String,
    pub accuracy: f64,
    pub is_real_ml: bool,
    pub data_source: String,
    pub training_days: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastResult {
    pub predictions: Vec<Prediction>,
    pub model_info: ModelInfo,
    /// True when this request trained a model, or wanted to and could not.
    pub needs_training: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionError {
    pub absolute: f64,
    pub percent: f64,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Confidence for trained forecast `day`, counted from 1 (tomorrow).
pub fn trained_confidence(day: usize) -> u8 {
    90usize.saturating_sub(3 * day).max(40) as u8
}

/// ± index units for trained forecast `day`, counted from 1.
pub fn trained_uncertainty(day: usize) -> u16 {
    (5 + 2 * day).min(50) as u16
}

/// Direction of the recent series: mean of the last three days against the
/// first three of the lookback window.
pub fn recent_trend(points: &[HistoricalPoint]) -> Trend {
    // ---
    let recent = &points[points.len().saturating_sub(TREND_LOOKBACK_DAYS)..];
    if recent.len() < 2 {
        return Trend::Stable;
    }
    let edge = recent.len().min(3);
    let mean = |slice: &[HistoricalPoint]| slice.iter().map(|p| p.index).sum::<f64>() / slice.len() as f64;

    classify_trend(mean(&recent[recent.len() - edge..]), mean(&recent[..edge]))
}

/// 24 hourly values around the current index following a daily cycle.
pub fn hourly_outlook(current_index: u16) -> Vec<u16> {
    (0..24)
        .map(|hour| {
            let phase = 2.0 * std::f64::consts::PI * hour as f64 / 24.0;
            clamp_index(current_index as f64 + 10.0 * phase.sin())
        })
        .collect()
}

/// Error of a past prediction once the real value is known.
pub fn prediction_error(predicted: f64, actual: f64) -> PredictionError {
    // ---
    let absolute = (predicted - actual).abs();
    let percent = if actual == 0.0 { 0.0 } else { absolute / actual * 100.0 };

    tracing::info!(
        "prediction accuracy: predicted {:.1}, actual {:.1}, error {:.1} ({:.1}%)",
        predicted,
        actual,
        absolute,
        percent
    );
    PredictionError {
        absolute: round1(absolute),
        percent: round1(percent),
    }
}

/// Score a reused model on the newest known day, from the window before it.
fn backtest_latest(model: &SequenceModel, points: &[HistoricalPoint]) -> Option<PredictionError> {
    // ---
    let (actual, history) = points.split_last()?;
    if history.len() < sequence::WINDOW {
        return None;
    }
    let window: Vec<_> = history[history.len() - sequence::WINDOW..]
        .iter()
        .map(|p| p.features())
        .collect();

    match model.predict_next(&window) {
        Ok(predicted) => Some(prediction_error(predicted, actual.index)),
        Err(e) => {
            tracing::debug!("backtest skipped: {}", e);
            None
        }
    }
}

fn statistical_result(
    current_index: u16,
    days: u32,
    today: NaiveDate,
    fallback_reason: Option<String>,
    needs_training: bool,
) -> ForecastResult {
    // ---
    let mut rng = rand::thread_rng();
    let predictions = statistical::forecast(current_index, days, today, &mut rng);

    ForecastResult {
        predictions,
        model_info: ModelInfo {
            algorithm: "Statistical trend projection".to_string(),
            training: "Seasonal and trend heuristics, no training".to_string(),
            accuracy: STATISTICAL_ACCURACY,
            is_real_ml: false,
            data_source: "Current reading".to_string(),
            training_days: 0,
            model_id: None,
            fallback_reason,
        },
        needs_training,
    }
}

pub struct ForecastEngine {
    registry: ModelRegistry,
    training: TrainingConfig,
}

impl ForecastEngine {
    // ---
    pub fn new(training: TrainingConfig, registry_capacity: usize) -> Self {
        Self {
            registry: ModelRegistry::new(registry_capacity),
            training,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Forecast `days` days from tomorrow.
    pub async fn forecast(
        &self,
        dataset: &Dataset,
        current_index: u16,
        days: u32,
        use_trained: bool,
        on_progress: Option<ProgressCallback>,
    ) -> ForecastResult {
        self.forecast_from(
            dataset,
            current_index,
            days,
            use_trained,
            on_progress,
            Utc::now().date_naive(),
        )
        .await
    }

    /// Forecast `days` days after `today`.
    pub async fn forecast_from(
        &self,
        dataset: &Dataset,
        current_index: u16,
        days: u32,
        use_trained: bool,
        on_progress: Option<ProgressCallback>,
        today: NaiveDate,
    ) -> ForecastResult {
        // ---
        if !use_trained {
            tracing::debug!("statistical forecast requested for {} days", days);
            return statistical_result(current_index, days, today, None, false);
        }

        match self.trained(dataset, days, on_progress, today).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("trained forecast unavailable, using statistical fallback: {}", e);
                statistical_result(current_index, days, today, Some(e.to_string()), true)
            }
        }
    }

    async fn trained(
        &self,
        dataset: &Dataset,
        days: u32,
        on_progress: Option<ProgressCallback>,
        today: NaiveDate,
    ) -> Result<ForecastResult> {
        // ---
        let points = &dataset.points;
        if points.len() < MIN_FORECAST_DAYS {
            return Err(AirQualityError::insufficient(
                MIN_FORECAST_DAYS,
                points.len(),
                "forecast",
            ));
        }

        let key = LocationKey::new(dataset.location.lat, dataset.location.lng);
        let (entry, needs_training) = match self.registry.get(&key).await {
            Some(entry) => {
                tracing::info!("reusing model {} for {}", entry.id, key);
                if let Some(scored) = backtest_latest(&entry.model, points) {
                    tracing::debug!(
                        "model {} off by {:.1} AQI ({:.1}%) on the latest day",
                        entry.id,
                        scored.absolute,
                        scored.percent
                    );
                }
                (entry, false)
            }
            None => {
                let entry = self.train(points.clone(), on_progress).await?;
                self.registry.insert(key, entry.clone()).await;
                (entry, true)
            }
        };

        let values = entry.model.forecast(points, days as usize)?;
        let model = &entry.model;
        let first_trend = recent_trend(points);

        let predictions = values
            .into_iter()
            .enumerate()
            .map(|(offset, value)| {
                let confidence = trained_confidence(offset + 1);
                let uncertainty = trained_uncertainty(offset + 1);

                let mut factors = vec![
                    "Echo state network over 7-day windows".to_string(),
                    format!("Trained on {} days of history", model.training_days),
                    format!("Uncertainty ±{} AQI", uncertainty),
                ];
                if offset == 0 {
                    factors.push(format!("Recent trend: {}", first_trend.as_str()));
                }
                if confidence < 60 {
                    factors.push("Low confidence: distant forecast".to_string());
                }

                Prediction {
                    date: today + chrono::Duration::days(offset as i64 + 1),
                    predicted_index: value.round().clamp(0.0, MAX_INDEX as f64) as u16,
                    confidence,
                    trend: if offset == 0 { first_trend } else { Trend::Stable },
                    factors,
                    uncertainty: Some(uncertainty),
                }
            })
            .collect();

        Ok(ForecastResult {
            predictions,
            model_info: ModelInfo {
                algorithm: "Echo state network (7-day window, 32-unit reservoir)".to_string(),
                training: format!(
                    "{} epochs on {} days, trained {}",
                    model.epochs,
                    model.training_days,
                    entry.trained_at.format("%Y-%m-%d %H:%M UTC")
                ),
                accuracy: round1(model.validation_accuracy),
                is_real_ml: true,
                data_source: format!(
                    "{} historical days ({:.1}% measured)",
                    dataset.total_points, dataset.completeness
                ),
                training_days: model.training_days,
                model_id: Some(entry.id),
                fallback_reason: None,
            },
            needs_training,
        })
    }

    /// Train off the async runtime, forwarding epoch progress.
    async fn train(
        &self,
        points: Vec<HistoricalPoint>,
        on_progress: Option<ProgressCallback>,
    ) -> Result<TrainedModel> {
        // ---
        let config = self.training.clone();

        let model = tokio::task::spawn_blocking(move || {
            let mut report = |progress: TrainingProgress| {
                tracing::debug!(
                    "epoch {}/{}: loss {:.4}, val_loss {:.4}, accuracy {:.1}%",
                    progress.epoch,
                    progress.total_epochs,
                    progress.loss,
                    progress.val_loss,
                    progress.accuracy
                );
                if let Some(callback) = &on_progress {
                    callback(progress);
                }
            };
            SequenceModel::train(&points, &config, &mut report)
        })
        .await
        .map_err(|e| AirQualityError::TrainingFailure(format!("training task failed: {}", e)))??;

        Ok(TrainedModel::new(model, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{HistoricalSource, Location, PollutantLevels};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dataset(days: usize) -> Dataset {
        let start = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        let points: Vec<HistoricalPoint> = start
            .iter_days()
            .take(days)
            .enumerate()
            .map(|(i, date)| {
                let index = 70.0 + 15.0 * (i as f64 / 3.0).sin();
                let levels = PollutantLevels {
                    pm25: index / 2.0,
                    ..PollutantLevels::default()
                };
                HistoricalPoint::new(date, index, levels, HistoricalSource::Ground, 1.0)
            })
            .collect();

        Dataset {
            location: Location {
                city: "Delhi".into(),
                country: "India".into(),
                lat: 28.61,
                lng: 77.21,
            },
            start_date: start,
            end_date: points.last().map(|p| p.date).unwrap_or(start),
            total_points: points.len(),
            completeness: 100.0,
            points,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()
    }

    fn engine() -> ForecastEngine {
        let config = TrainingConfig {
            epochs: 5,
            ..TrainingConfig::default()
        };
        ForecastEngine::new(config, 4)
    }

    #[tokio::test]
    async fn test_statistical_by_choice() {
        // ---
        let result = engine()
            .forecast_from(&dataset(60), 80, 7, false, None, today())
            .await;

        assert_eq!(result.predictions.len(), 7);
        assert!(!result.model_info.is_real_ml);
        assert!(!result.needs_training);
        assert_eq!(result.model_info.accuracy, 75.0);
        assert!(result.model_info.fallback_reason.is_none());
    }

    #[tokio::test]
    async fn test_short_history_falls_back() {
        // ---
        let result = engine()
            .forecast_from(&dataset(2), 80, 5, true, None, today())
            .await;

        assert_eq!(result.predictions.len(), 5);
        assert!(!result.model_info.is_real_ml);
        assert!(result.needs_training);
        let reason = result.model_info.fallback_reason.unwrap();
        assert!(reason.contains("insufficient history"), "{reason}");
    }

    #[tokio::test]
    async fn test_training_failure_falls_back() {
        // ---
        let result = engine()
            .forecast_from(&dataset(5), 80, 3, true, None, today())
            .await;

        assert!(!result.model_info.is_real_ml);
        assert!(result.model_info.fallback_reason.unwrap().contains("training failed"));
    }

    #[tokio::test]
    async fn test_trained_then_reused() {
        // ---
        let engine = engine();
        let epochs_seen = Arc::new(AtomicUsize::new(0));
        let counter = epochs_seen.clone();
        let progress: ProgressCallback = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let data = dataset(60);
        let first = engine
            .forecast_from(&data, 80, 14, true, Some(progress), today())
            .await;

        assert!(first.model_info.is_real_ml);
        assert!(first.needs_training);
        assert_eq!(epochs_seen.load(Ordering::SeqCst), 5);
        assert_eq!(first.predictions.len(), 14);
        assert_eq!(first.predictions[0].confidence, 87);
        assert_eq!(first.predictions[0].uncertainty, Some(7));
        assert_eq!(first.predictions[0].date, NaiveDate::from_ymd_opt(2025, 4, 2).unwrap());
        assert!(first
            .predictions
            .windows(2)
            .all(|w| w[1].confidence <= w[0].confidence));
        assert!(first.predictions[1..].iter().all(|p| p.trend == Trend::Stable));

        let second = engine.forecast_from(&data, 80, 3, true, None, today()).await;
        assert!(second.model_info.is_real_ml);
        assert!(!second.needs_training);
        assert_eq!(second.model_info.model_id, first.model_info.model_id);
        assert_eq!(engine.registry().len().await, 1);
    }

    #[tokio::test]
    async fn test_reused_model_forecasts_from_short_history() {
        // ---
        let engine = engine();
        let trained = engine.forecast_from(&dataset(60), 80, 3, true, None, today()).await;
        assert!(trained.model_info.is_real_ml);

        let short = engine.forecast_from(&dataset(5), 80, 4, true, None, today()).await;
        assert!(short.model_info.is_real_ml, "{:?}", short.model_info.fallback_reason);
        assert!(!short.needs_training);
        assert_eq!(short.model_info.model_id, trained.model_info.model_id);
        assert_eq!(short.predictions.len(), 4);
    }

    #[test]
    fn test_backtest_needs_a_full_window() {
        // ---
        let data = dataset(30);
        let config = TrainingConfig {
            epochs: 3,
            ..TrainingConfig::default()
        };
        let model = SequenceModel::train(&data.points, &config, &mut |_| {}).unwrap();

        let scored = backtest_latest(&model, &data.points).unwrap();
        assert!(scored.absolute >= 0.0);
        assert!(backtest_latest(&model, &data.points[..7]).is_none());
    }

    #[test]
    fn test_trained_confidence_and_uncertainty_bounds() {
        // ---
        assert_eq!(trained_confidence(1), 87);
        assert_eq!(trained_confidence(10), 60);
        assert_eq!(trained_confidence(30), 40);
        assert_eq!(trained_uncertainty(1), 7);
        assert_eq!(trained_uncertainty(7), 19);
        assert_eq!(trained_uncertainty(30), 50);
    }

    #[test]
    fn test_hourly_outlook_cycle() {
        // ---
        let hours = hourly_outlook(100);
        assert_eq!(hours.len(), 24);
        assert_eq!(hours[0], 100);
        assert_eq!(hours[6], 110);
        assert_eq!(hours[18], 90);

        assert!(hourly_outlook(495).iter().all(|h| *h <= 500));
        assert_eq!(hourly_outlook(0)[18], 0);
    }

    #[test]
    fn test_prediction_error() {
        // ---
        let err = prediction_error(110.0, 100.0);
        assert_eq!(err.absolute, 10.0);
        assert_eq!(err.percent, 10.0);
        assert_eq!(prediction_error(5.0, 0.0).percent, 0.0);
    }

    #[test]
    fn test_recent_trend() {
        // ---
        let mut data = dataset(30);
        for (i, p) in data.points.iter_mut().enumerate() {
            p.index = 50.0 + i as f64 * 2.0;
        }
        assert_eq!(recent_trend(&data.points), Trend::Worsening);
        assert_eq!(recent_trend(&data.points[..1]), Trend::Stable);
    }
}
