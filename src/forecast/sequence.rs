//! Trained sequence forecaster: an echo state network over 7-day windows.
//!
//! Each window is fed day by day through a fixed, randomly initialised tanh
//! reservoir; the final reservoir state is mapped to the next day's
//! normalised index by a linear readout. Only the readout is trained, with
//! mini-batch gradient descent on mean squared error, so training is cheap
//! enough to run per location on first request.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::TrainingProgress;
use crate::aqi::MAX_INDEX;
use crate::error::{AirQualityError, Result};
use crate::models::HistoricalPoint;

/// Days per input window.
pub const WINDOW: usize = 7;

/// `[index, PM2.5, PM10, O3, NO2, SO2, CO]`.
pub const FEATURES: usize = 7;

pub const RESERVOIR_SIZE: usize = 32;

/// Pollutant levels assumed for a predicted day, as fractions of its index,
/// in feature order after the index.
pub const SYNTHETIC_POLLUTANT_FRACTIONS: [f64; FEATURES - 1] = [0.5, 0.7, 0.3, 0.2, 0.1, 0.4];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    /// Fraction of windows held out from the tail for validation.
    pub validation_split: f64,
    pub spectral_radius: f64,
    pub leak_rate: f64,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            learning_rate: 0.02,
            batch_size: 16,
            validation_split: 0.2,
            spectral_radius: 0.9,
            leak_rate: 0.5,
            seed: 42,
        }
    }
}

/// Per-column min-max scaling fitted on the training dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalizer {
    mins: [f64; FEATURES],
    maxs: [f64; FEATURES],
}

impl Normalizer {
    // ---
    pub fn fit(rows: &[[f64; FEATURES]]) -> Self {
        let mut mins = [f64::INFINITY; FEATURES];
        let mut maxs = [f64::NEG_INFINITY; FEATURES];
        for row in rows {
            for (col, value) in row.iter().enumerate() {
                mins[col] = mins[col].min(*value);
                maxs[col] = maxs[col].max(*value);
            }
        }
        for col in 0..FEATURES {
            if !mins[col].is_finite() {
                mins[col] = 0.0;
                maxs[col] = 0.0;
            }
        }
        Self { mins, maxs }
    }

    /// Constant columns scale by 1 instead of dividing by zero.
    fn range(&self, col: usize) -> f64 {
        let range = self.maxs[col] - self.mins[col];
        if range > 0.0 {
            range
        } else {
            1.0
        }
    }

    pub fn normalize(&self, row: &[f64; FEATURES]) -> [f64; FEATURES] {
        let mut out = [0.0; FEATURES];
        for col in 0..FEATURES {
            out[col] = (row[col] - self.mins[col]) / self.range(col);
        }
        out
    }

    pub fn denormalize_index(&self, value: f64) -> f64 {
        value * self.range(0) + self.mins[0]
    }
}

/// Input windows and next-day labels, normalised.
fn build_windows(rows: &[[f64; FEATURES]]) -> Vec<(&[[f64; FEATURES]], f64)> {
    if rows.len() <= WINDOW {
        return Vec::new();
    }
    (0..rows.len() - WINDOW)
        .map(|start| (&rows[start..start + WINDOW], rows[start + WINDOW][0]))
        .collect()
}

/// A trained forecaster for one location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceModel {
    normalizer: Normalizer,
    input_weights: Vec<Vec<f64>>,
    reservoir_weights: Vec<Vec<f64>>,
    leak_rate: f64,
    /// Readout weights, bias last.
    readout: Vec<f64>,
    pub training_days: usize,
    pub epochs: usize,
    pub final_loss: f64,
    pub validation_loss: f64,
    /// `100 - validation MAE%` on the normalised scale.
    pub validation_accuracy: f64,
}

impl SequenceModel {
    /// Fit a model on `points`, reporting every epoch to `on_epoch`.
    pub fn train(
        points: &[HistoricalPoint],
        config: &TrainingConfig,
        on_epoch: &mut dyn FnMut(TrainingProgress),
    ) -> Result<SequenceModel> {
        // ---
        let raw: Vec<[f64; FEATURES]> = points.iter().map(|p| p.features()).collect();
        let normalizer = Normalizer::fit(&raw);
        let rows: Vec<[f64; FEATURES]> = raw.iter().map(|r| normalizer.normalize(r)).collect();

        let windows = build_windows(&rows);
        if windows.len() < 2 {
            return Err(AirQualityError::TrainingFailure(format!(
                "need at least {} days to build two training windows, have {}",
                WINDOW + 2,
                points.len()
            )));
        }

        let held_out = ((windows.len() as f64 * config.validation_split).round() as usize)
            .clamp(1, windows.len() - 1);
        let train_len = windows.len() - held_out;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut model = SequenceModel {
            normalizer,
            input_weights: random_matrix(&mut rng, RESERVOIR_SIZE, FEATURES, 1.0),
            reservoir_weights: random_matrix(
                &mut rng,
                RESERVOIR_SIZE,
                RESERVOIR_SIZE,
                // Uniform [-1, 1] entries give a spectral radius near sqrt(n / 3)
                config.spectral_radius / (RESERVOIR_SIZE as f64 / 3.0).sqrt(),
            ),
            leak_rate: config.leak_rate,
            readout: vec![0.0; RESERVOIR_SIZE + 1],
            training_days: points.len(),
            epochs: config.epochs,
            final_loss: 0.0,
            validation_loss: 0.0,
            validation_accuracy: 0.0,
        };

        let states: Vec<(Vec<f64>, f64)> = windows
            .iter()
            .map(|(window, label)| (model.run_reservoir(window), *label))
            .collect();
        let (train_set, validation_set) = states.split_at(train_len);

        tracing::info!(
            "training sequence model: {} days, {} train / {} validation windows, {} epochs",
            points.len(),
            train_set.len(),
            validation_set.len(),
            config.epochs
        );

        let mut order: Vec<usize> = (0..train_set.len()).collect();
        let batch_size = config.batch_size.max(1);

        for epoch in 0..config.epochs {
            order.shuffle(&mut rng);
            for batch in order.chunks(batch_size) {
                let mut gradient = vec![0.0; RESERVOIR_SIZE + 1];
                for &i in batch {
                    let (state, label) = &train_set[i];
                    let error = model.readout_value(state) - label;
                    for (g, x) in gradient.iter_mut().zip(state.iter().chain([1.0].iter())) {
                        *g += 2.0 * error * x;
                    }
                }
                let scale = config.learning_rate / batch.len() as f64;
                for (w, g) in model.readout.iter_mut().zip(&gradient) {
                    *w -= scale * g;
                }
            }

            let (loss, _) = model.evaluate(train_set);
            let (val_loss, val_mae) = model.evaluate(validation_set);
            if !loss.is_finite() || !val_loss.is_finite() {
                return Err(AirQualityError::TrainingFailure(format!(
                    "loss diverged at epoch {}",
                    epoch + 1
                )));
            }

            model.final_loss = loss;
            model.validation_loss = val_loss;
            model.validation_accuracy = (100.0 - val_mae * 100.0).clamp(0.0, 100.0);

            on_epoch(TrainingProgress {
                epoch: epoch + 1,
                total_epochs: config.epochs,
                loss,
                val_loss,
                accuracy: model.validation_accuracy,
            });
        }

        tracing::info!(
            "sequence model trained: loss {:.4}, val_loss {:.4}, accuracy {:.1}%",
            model.final_loss,
            model.validation_loss,
            model.validation_accuracy
        );
        Ok(model)
    }

    /// Final reservoir state after feeding `window` oldest first.
    fn run_reservoir(&self, window: &[[f64; FEATURES]]) -> Vec<f64> {
        // ---
        let mut state = vec![0.0; RESERVOIR_SIZE];
        for input in window {
            let next: Vec<f64> = (0..RESERVOIR_SIZE)
                .map(|i| {
                    let drive: f64 = self.input_weights[i]
                        .iter()
                        .zip(input.iter())
                        .map(|(w, u)| w * u)
                        .sum::<f64>()
                        + self.reservoir_weights[i]
                            .iter()
                            .zip(&state)
                            .map(|(w, x)| w * x)
                            .sum::<f64>();
                    (1.0 - self.leak_rate) * state[i] + self.leak_rate * drive.tanh()
                })
                .collect();
            state = next;
        }
        state
    }

    fn readout_value(&self, state: &[f64]) -> f64 {
        let bias = self.readout[RESERVOIR_SIZE];
        state
            .iter()
            .zip(&self.readout)
            .map(|(x, w)| x * w)
            .sum::<f64>()
            + bias
    }

    /// `(mse, mae)` over a set of precomputed states.
    fn evaluate(&self, set: &[(Vec<f64>, f64)]) -> (f64, f64) {
        if set.is_empty() {
            return (0.0, 0.0);
        }
        let (se, ae) = set.iter().fold((0.0, 0.0), |(se, ae), (state, label)| {
            let error = self.readout_value(state) - label;
            (se + error * error, ae + error.abs())
        });
        (se / set.len() as f64, ae / set.len() as f64)
    }

    /// Next-day index for a window of raw feature rows.
    pub fn predict_next(&self, window: &[[f64; FEATURES]]) -> Result<f64> {
        // ---
        if window.len() != WINDOW {
            return Err(AirQualityError::TrainingFailure(format!(
                "prediction window has {} days, expected {}",
                window.len(),
                WINDOW
            )));
        }

        let normalized: Vec<[f64; FEATURES]> =
            window.iter().map(|r| self.normalizer.normalize(r)).collect();
        let value = self
            .normalizer
            .denormalize_index(self.readout_value(&self.run_reservoir(&normalized)));

        if !value.is_finite() {
            return Err(AirQualityError::TrainingFailure("non-finite prediction".into()));
        }
        Ok(value.clamp(0.0, MAX_INDEX as f64))
    }

    /// Walk forward `days` steps from the end of `history`, feeding each
    /// prediction back in as a synthetic day.
    ///
    /// A history shorter than [`WINDOW`] repeats its oldest day until the
    /// window is full.
    pub fn forecast(&self, history: &[HistoricalPoint], days: usize) -> Result<Vec<f64>> {
        // ---
        let Some(oldest) = history.iter().rev().take(WINDOW).last() else {
            return Err(AirQualityError::insufficient(1, 0, "sequence forecast"));
        };

        let tail = &history[history.len().saturating_sub(WINDOW)..];
        let mut window: Vec<[f64; FEATURES]> = std::iter::repeat(oldest.features())
            .take(WINDOW - tail.len())
            .chain(tail.iter().map(|p| p.features()))
            .collect();
        let mut predictions = Vec::with_capacity(days);

        for _ in 0..days {
            let value = self.predict_next(&window)?;
            predictions.push(value);

            window.remove(0);
            window.push(synthetic_day(value));
        }

        Ok(predictions)
    }
}

/// Feature row for a predicted day.
pub fn synthetic_day(index: f64) -> [f64; FEATURES] {
    let mut row = [index; FEATURES];
    for (slot, fraction) in row[1..].iter_mut().zip(SYNTHETIC_POLLUTANT_FRACTIONS) {
        *slot = index * fraction;
    }
    row
}

fn random_matrix(rng: &mut StdRng, rows: usize, cols: usize, scale: f64) -> Vec<Vec<f64>> {
    (0..rows)
        .map(|_| {
            (0..cols)
                .map(|_| (rng.gen::<f64>() * 2.0 - 1.0) * scale)
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{HistoricalSource, PollutantLevels};
    use chrono::NaiveDate;

    fn series(days: usize) -> Vec<HistoricalPoint> {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        start
            .iter_days()
            .take(days)
            .enumerate()
            .map(|(i, date)| {
                let index = 60.0 + 20.0 * (i as f64 * 2.0 * std::f64::consts::PI / 7.0).sin();
                let levels = PollutantLevels {
                    pm25: index / 2.0,
                    pm10: index * 0.7,
                    ..PollutantLevels::default()
                };
                HistoricalPoint::new(date, index, levels, HistoricalSource::Ground, 1.0)
            })
            .collect()
    }

    #[test]
    fn test_normalizer_constant_column() {
        // ---
        let rows = [[10.0, 5.0, 0.0, 0.0, 0.0, 0.0, 0.0], [30.0, 5.0, 0.0, 0.0, 0.0, 0.0, 0.0]];
        let normalizer = Normalizer::fit(&rows);

        let scaled = normalizer.normalize(&rows[1]);
        assert_eq!(scaled[0], 1.0);
        assert_eq!(scaled[1], 0.0);
        assert_eq!(normalizer.denormalize_index(0.5), 20.0);
    }

    #[test]
    fn test_train_reports_every_epoch() {
        // ---
        let config = TrainingConfig {
            epochs: 12,
            ..TrainingConfig::default()
        };
        let mut seen = Vec::new();
        let model = SequenceModel::train(&series(60), &config, &mut |p| seen.push(p)).unwrap();

        assert_eq!(seen.len(), 12);
        assert_eq!(seen[0].epoch, 1);
        assert_eq!(seen[11].total_epochs, 12);
        assert!(seen.last().unwrap().loss <= seen[0].loss);
        assert!((0.0..=100.0).contains(&model.validation_accuracy));
    }

    #[test]
    fn test_train_needs_two_windows() {
        // ---
        let err = SequenceModel::train(&series(8), &TrainingConfig::default(), &mut |_| {}).unwrap_err();
        assert!(matches!(err, AirQualityError::TrainingFailure(_)));
    }

    #[test]
    fn test_forecast_walks_forward_within_bounds() {
        // ---
        let history = series(60);
        let model = SequenceModel::train(&history, &TrainingConfig::default(), &mut |_| {}).unwrap();

        let values = model.forecast(&history, 5).unwrap();
        assert_eq!(values.len(), 5);
        assert!(values.iter().all(|v| (0.0..=500.0).contains(v)));

        assert!(model.forecast(&[], 5).is_err());
    }

    #[test]
    fn test_forecast_pads_short_history_with_oldest_day() {
        // ---
        let history = series(60);
        let model = SequenceModel::train(&history, &TrainingConfig::default(), &mut |_| {}).unwrap();

        let short = &history[55..];
        let mut padded = vec![short[0].clone(); 2];
        padded.extend_from_slice(short);
        assert_eq!(padded.len(), WINDOW);

        let values = model.forecast(short, 3).unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values, model.forecast(&padded, 3).unwrap());
    }

    #[test]
    fn test_synthetic_day_fractions() {
        // ---
        let row = synthetic_day(100.0);
        assert_eq!(row, [100.0, 50.0, 70.0, 30.0, 20.0, 10.0, 40.0]);
    }
}
