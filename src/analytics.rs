//! Analytics over a collected dataset: weekly view, monthly and yearly
//! rollups, pollutant trends and a quick summary.
//!
//! Everything here is a pure function over an ascending, one-per-day point
//! slice. Trend classification uses a single fixed threshold,
//! [`TREND_THRESHOLD_PCT`].

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::error::{AirQualityError, Result};
use crate::models::{HistoricalPoint, HistoricalSource, PollutantKey, PollutantLevels, Direction, Trend};

/// Percent change beyond which a series counts as moving.
pub const TREND_THRESHOLD_PCT: f64 = 5.0;

/// Fewest points for which trend rollups are meaningful.
pub const MIN_ANALYTICS_DAYS: usize = 7;

/// Length of each window compared by [`pollutant_trend`].
pub const POLLUTANT_WINDOW_DAYS: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyAnalysis {
    pub year: i32,
    pub month: u32,
    /// e.g. "March 2025".
    pub label: String,
    pub average_index: f64,
    pub min_index: f64,
    pub max_index: f64,
    pub average_pm25: f64,
    pub average_pm10: f64,
    pub good_days: usize,
    pub moderate_days: usize,
    pub unhealthy_days: usize,
    pub total_days: usize,
    /// Against the preceding month in the series.
    pub trend: Trend,
    pub change_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearlyAnalysis {
    pub year: i32,
    pub average_index: f64,
    pub min_index: f64,
    pub max_index: f64,
    pub average_pm25: f64,
    pub average_pm10: f64,
    pub good_days: usize,
    pub moderate_days: usize,
    pub unhealthy_days: usize,
    pub total_days: usize,
    pub best_month: Option<String>,
    pub worst_month: Option<String>,
    /// Later half of the year's months against the earlier half.
    pub trend: Trend,
    pub year_over_year_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollutantTrend {
    pub pollutant: PollutantKey,
    pub label: String,
    pub unit: String,
    pub current_average: f64,
    pub previous_average: f64,
    pub change_pct: f64,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSummary {
    pub average_index: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuickSummary {
    pub last_7_days: PeriodSummary,
    pub last_30_days: PeriodSummary,
    pub last_12_months: PeriodSummary,
    pub best_month: Option<String>,
    pub worst_month: Option<String>,
}

// ---

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Mean of the strictly positive values; zero means "not measured".
fn positive_mean(values: impl IntoIterator<Item = f64>) -> f64 {
    mean(values.into_iter().filter(|v| *v > 0.0))
}

/// Percent change from `previous` to `current`. Zero when `previous` is zero.
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return 0.0;
    }
    (current - previous) / previous * 100.0
}

/// Index trend: falling index means improving air.
pub fn classify_trend(current: f64, previous: f64) -> Trend {
    let change = percent_change(current, previous);
    if change < -TREND_THRESHOLD_PCT {
        Trend::Improving
    } else if change > TREND_THRESHOLD_PCT {
        Trend::Worsening
    } else {
        Trend::Stable
    }
}

/// Concentration direction at the same threshold.
pub fn classify_direction(current: f64, previous: f64) -> Direction {
    match classify_trend(current, previous) {
        Trend::Improving => Direction::Down,
        Trend::Worsening => Direction::Up,
        Trend::Stable => Direction::Stable,
    }
}

/// Later half against earlier half, split at `len / 2`.
fn halves_trend(values: &[f64]) -> Trend {
    if values.len() < 2 {
        return Trend::Stable;
    }
    let (earlier, later) = values.split_at(values.len() / 2);
    classify_trend(mean(later.iter().copied()), mean(earlier.iter().copied()))
}

fn require_history(points: &[HistoricalPoint], context: &str) -> Result<()> {
    if points.len() < MIN_ANALYTICS_DAYS {
        return Err(AirQualityError::insufficient(
            MIN_ANALYTICS_DAYS,
            points.len(),
            context,
        ));
    }
    Ok(())
}

/// Shared aggregates for a group of days.
struct Rollup {
    average_index: f64,
    min_index: f64,
    max_index: f64,
    average_pm25: f64,
    average_pm10: f64,
    good_days: usize,
    moderate_days: usize,
    unhealthy_days: usize,
    total_days: usize,
}

impl Rollup {
    fn of(points: &[&HistoricalPoint]) -> Self {
        // ---
        let indices = || points.iter().map(|p| p.index);
        Rollup {
            average_index: mean(indices()),
            min_index: indices().fold(f64::INFINITY, f64::min),
            max_index: indices().fold(f64::NEG_INFINITY, f64::max),
            average_pm25: positive_mean(points.iter().map(|p| p.pollutants.pm25)),
            average_pm10: positive_mean(points.iter().map(|p| p.pollutants.pm10)),
            good_days: indices().filter(|i| *i <= 50.0).count(),
            moderate_days: indices().filter(|i| *i > 50.0 && *i <= 100.0).count(),
            unhealthy_days: indices().filter(|i| *i > 100.0).count(),
            total_days: points.len(),
        }
    }
}

fn month_label(year: i32, month: u32) -> String {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|d| d.format("%B %Y").to_string())
        .unwrap_or_else(|| format!("{year}-{month:02}"))
}

// ---

/// The seven days ending on `end`, oldest first.
///
/// Dates missing from `points` appear as zero-valued placeholders tagged
/// [`HistoricalSource::Unavailable`].
pub fn weekly(points: &[HistoricalPoint], end: NaiveDate) -> Vec<HistoricalPoint> {
    // ---
    let by_date: BTreeMap<NaiveDate, &HistoricalPoint> = points.iter().map(|p| (p.date, p)).collect();
    let start = end - Duration::days(6);

    start
        .iter_days()
        .take(7)
        .map(|date| match by_date.get(&date) {
            Some(point) => (*point).clone(),
            None => HistoricalPoint::new(
                date,
                0.0,
                PollutantLevels::default(),
                HistoricalSource::Unavailable,
                0.0,
            ),
        })
        .collect()
}

/// Per-month rollups in calendar order, each trended against the month before.
pub fn monthly(points: &[HistoricalPoint]) -> Result<Vec<MonthlyAnalysis>> {
    // ---
    require_history(points, "monthly analysis")?;

    let mut groups: BTreeMap<(i32, u32), Vec<&HistoricalPoint>> = BTreeMap::new();
    for point in points {
        groups
            .entry((point.date.year(), point.date.month()))
            .or_default()
            .push(point);
    }

    let mut months = Vec::with_capacity(groups.len());
    let mut previous: Option<f64> = None;

    for ((year, month), group) in groups {
        let r = Rollup::of(&group);
        let (trend, change_pct) = match previous {
            Some(prev) => (
                classify_trend(r.average_index, prev),
                round1(percent_change(r.average_index, prev)),
            ),
            None => (Trend::Stable, 0.0),
        };
        previous = Some(r.average_index);

        months.push(MonthlyAnalysis {
            year,
            month,
            label: month_label(year, month),
            average_index: round1(r.average_index),
            min_index: round1(r.min_index),
            max_index: round1(r.max_index),
            average_pm25: round1(r.average_pm25),
            average_pm10: round1(r.average_pm10),
            good_days: r.good_days,
            moderate_days: r.moderate_days,
            unhealthy_days: r.unhealthy_days,
            total_days: r.total_days,
            trend,
            change_pct,
        });
    }

    tracing::debug!("monthly analysis: {} months from {} points", months.len(), points.len());
    Ok(months)
}

/// Per-year rollups with best/worst month and year-over-year change.
pub fn yearly(points: &[HistoricalPoint]) -> Result<Vec<YearlyAnalysis>> {
    // ---
    require_history(points, "yearly analysis")?;
    let months = monthly(points)?;

    let mut groups: BTreeMap<i32, Vec<&HistoricalPoint>> = BTreeMap::new();
    for point in points {
        groups.entry(point.date.year()).or_default().push(point);
    }

    let mut years = Vec::with_capacity(groups.len());
    let mut previous: Option<(i32, f64)> = None;

    for (year, group) in groups {
        let r = Rollup::of(&group);
        let year_months: Vec<&MonthlyAnalysis> = months.iter().filter(|m| m.year == year).collect();

        let best = year_months
            .iter()
            .min_by(|a, b| a.average_index.total_cmp(&b.average_index))
            .map(|m| m.label.clone());
        let worst = year_months
            .iter()
            .max_by(|a, b| a.average_index.total_cmp(&b.average_index))
            .map(|m| m.label.clone());

        let monthly_means: Vec<f64> = year_months.iter().map(|m| m.average_index).collect();

        let year_over_year_pct = previous
            .filter(|(prev_year, _)| *prev_year == year - 1)
            .map(|(_, prev)| round1(percent_change(r.average_index, prev)));
        previous = Some((year, r.average_index));

        years.push(YearlyAnalysis {
            year,
            average_index: round1(r.average_index),
            min_index: round1(r.min_index),
            max_index: round1(r.max_index),
            average_pm25: round1(r.average_pm25),
            average_pm10: round1(r.average_pm10),
            good_days: r.good_days,
            moderate_days: r.moderate_days,
            unhealthy_days: r.unhealthy_days,
            total_days: r.total_days,
            best_month: best,
            worst_month: worst,
            trend: halves_trend(&monthly_means),
            year_over_year_pct,
        });
    }

    Ok(years)
}

/// Last 30 days against the 30 before them for one pollutant.
pub fn pollutant_trend(points: &[HistoricalPoint], key: PollutantKey) -> Result<PollutantTrend> {
    // ---
    require_history(points, "pollutant trend")?;

    let split = points.len().saturating_sub(POLLUTANT_WINDOW_DAYS);
    let (before, current) = points.split_at(split);
    let previous = &before[before.len().saturating_sub(POLLUTANT_WINDOW_DAYS)..];

    let current_average = positive_mean(current.iter().map(|p| p.pollutants.get(key)));
    let previous_average = positive_mean(previous.iter().map(|p| p.pollutants.get(key)));

    Ok(PollutantTrend {
        pollutant: key,
        label: key.label().to_string(),
        unit: key.unit().to_string(),
        current_average: round1(current_average),
        previous_average: round1(previous_average),
        change_pct: round1(percent_change(current_average, previous_average)),
        direction: classify_direction(current_average, previous_average),
    })
}

/// [`pollutant_trend`] for every tracked pollutant.
pub fn pollutant_trends(points: &[HistoricalPoint]) -> Result<Vec<PollutantTrend>> {
    PollutantKey::ALL
        .iter()
        .map(|key| pollutant_trend(points, *key))
        .collect()
}

pub fn quick_summary(points: &[HistoricalPoint]) -> Result<QuickSummary> {
    // ---
    require_history(points, "summary")?;

    let tail = |n: usize| -> Vec<f64> {
        points[points.len().saturating_sub(n)..]
            .iter()
            .map(|p| p.index)
            .collect()
    };
    let period = |values: Vec<f64>| PeriodSummary {
        average_index: round1(mean(values.iter().copied())),
        trend: halves_trend(&values),
    };

    let months = monthly(points)?;
    let recent_months = &months[months.len().saturating_sub(12)..];
    let monthly_means: Vec<f64> = recent_months.iter().map(|m| m.average_index).collect();

    let best_month = recent_months
        .iter()
        .min_by(|a, b| a.average_index.total_cmp(&b.average_index))
        .map(|m| m.label.clone());
    let worst_month = recent_months
        .iter()
        .max_by(|a, b| a.average_index.total_cmp(&b.average_index))
        .map(|m| m.label.clone());

    Ok(QuickSummary {
        last_7_days: period(tail(7)),
        last_30_days: period(tail(30)),
        last_12_months: period(monthly_means),
        best_month,
        worst_month,
    })
}
