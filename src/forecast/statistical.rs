//! Statistical fallback forecaster: trend and season applied to the current
//! index, plus a little noise. Stateless and always available.

use chrono::{Datelike, Duration, NaiveDate};
use rand::Rng;

use crate::aqi::MAX_INDEX;
use crate::models::{Prediction, Trend};

pub const START_CONFIDENCE: u8 = 85;
pub const CONFIDENCE_STEP: u8 = 3;
pub const CONFIDENCE_FLOOR: u8 = 50;

/// Half-width of the daily noise band, in index units.
pub const JITTER: f64 = 2.5;

/// Trend implied by the current index alone.
pub fn trend_for_index(index: u16) -> Trend {
    match index {
        0..=49 => Trend::Improving,
        151.. => Trend::Worsening,
        _ => Trend::Stable,
    }
}

fn trend_factor(trend: Trend) -> f64 {
    match trend {
        Trend::Improving => 0.96,
        Trend::Stable => 1.0,
        Trend::Worsening => 1.04,
    }
}

/// Winter (Dec–Feb) and summer (Jun–Aug) multipliers.
pub fn seasonal_factor(month: u32) -> f64 {
    match month {
        12 | 1 | 2 => 1.10,
        6..=8 => 0.92,
        _ => 1.0,
    }
}

fn season_note(month: u32) -> &'static str {
    match month {
        12 | 1 | 2 => "Winter conditions typically trap pollutants",
        6..=8 => "Summer mixing typically disperses pollutants",
        _ => "No strong seasonal effect expected",
    }
}

/// Confidence for the forecast day at 0-based `offset`.
pub fn confidence_for(offset: u32) -> u8 {
    let drop = CONFIDENCE_STEP as u32 * offset;
    (START_CONFIDENCE as u32).saturating_sub(drop).max(CONFIDENCE_FLOOR as u32) as u8
}

/// `days` predictions starting the day after `today`.
pub fn forecast<R: Rng>(
    current_index: u16,
    days: u32,
    today: NaiveDate,
    rng: &mut R,
) -> Vec<Prediction> {
    // ---
    let trend = trend_for_index(current_index);
    let factor = trend_factor(trend);
    let mut value = current_index as f64;

    (0..days)
        .map(|offset| {
            let date = today + Duration::days(i64::from(offset) + 1);
            let month = date.month();

            value = (value * factor * seasonal_factor(month) + rng.gen_range(-JITTER..=JITTER))
                .clamp(0.0, MAX_INDEX as f64);
            let confidence = confidence_for(offset);

            let mut factors = vec![
                "Statistical projection from the current reading".to_string(),
                season_note(month).to_string(),
                format!("Current trend: {}", trend.as_str()),
            ];
            if confidence < 60 {
                factors.push("Lower confidence for distant forecast".to_string());
            }

            Prediction {
                date,
                predicted_index: value.round() as u16,
                confidence,
                trend: if offset == 0 { trend } else { Trend::Stable },
                factors,
                uncertainty: None,
            }
        })
        .collect()
}
