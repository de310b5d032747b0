//! Historical collector: fixed-length, gap-filled daily series per location.
//!
//! Ground and satellite history are fetched together; satellite days are laid
//! down first and ground days overwrite them. Every date in the requested
//! window is then present exactly once, filled by interpolation when no
//! source covered it. Finished datasets go through the [`CacheStore`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};

use crate::cache::{get_fresh, put_value, CacheStore};
use crate::error::AirQualityError;
use crate::geo::{coordinate_label, LocationKey};
use crate::models::{Dataset, HistoricalPoint, HistoricalSource, Location};
use crate::providers::{bounded, HistorySource};

/// Confidence of a day interpolated between two known days.
pub const INTERPOLATED_CONFIDENCE: f64 = 0.5;

/// Confidence of a day copied from its nearest known neighbour.
pub const REPEATED_CONFIDENCE: f64 = 0.4;

/// Longest window a single collection covers.
pub const MAX_HISTORY_DAYS: u32 = 730;

pub fn dataset_cache_key(lat: f64, lng: f64) -> String {
    format!("aqi_history_{}", LocationKey::new(lat, lng))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ---

/// Lay satellite points down first, then let ground points overwrite.
///
/// Points outside `[start, end]` are dropped.
pub fn merge(
    satellite: Vec<HistoricalPoint>,
    ground: Vec<HistoricalPoint>,
    start: NaiveDate,
    end: NaiveDate,
) -> BTreeMap<NaiveDate, HistoricalPoint> {
    // ---
    let mut merged = BTreeMap::new();
    for point in satellite.into_iter().chain(ground) {
        if point.date >= start && point.date <= end {
            merged.insert(point.date, point);
        }
    }
    merged
}

/// One point per date from `start` for `days` days.
///
/// Missing dates between two known days are linearly interpolated by elapsed
/// time. Missing dates with a neighbour on one side only copy that neighbour.
/// With no known days at all the result is empty.
pub fn gap_fill(
    known: &BTreeMap<NaiveDate, HistoricalPoint>,
    start: NaiveDate,
    days: u32,
) -> Vec<HistoricalPoint> {
    // ---
    let mut filled = Vec::with_capacity(days as usize);

    for date in start.iter_days().take(days as usize) {
        if let Some(point) = known.get(&date) {
            filled.push(point.clone());
            continue;
        }

        let before = known.range(..date).next_back().map(|(_, p)| p);
        let after = known.range(date..).next().map(|(_, p)| p);

        let point = match (before, after) {
            (Some(prev), Some(next)) => {
                let span = (next.date - prev.date).num_days() as f64;
                let ratio = (date - prev.date).num_days() as f64 / span;
                let lerp = |a: f64, b: f64| round1(a + (b - a) * ratio);

                HistoricalPoint::new(
                    date,
                    lerp(prev.index, next.index),
                    prev.pollutants.combine(&next.pollutants, lerp),
                    HistoricalSource::Interpolated,
                    INTERPOLATED_CONFIDENCE,
                )
            }
            (Some(neighbour), None) | (None, Some(neighbour)) => HistoricalPoint::new(
                date,
                neighbour.index,
                neighbour.pollutants,
                HistoricalSource::Interpolated,
                REPEATED_CONFIDENCE,
            ),
            (None, None) => continue,
        };
        filled.push(point);
    }

    filled
}

/// Percentage of non-interpolated points, 1 decimal. Zero for an empty series.
pub fn completeness(points: &[HistoricalPoint]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let real = points.iter().filter(|p| !p.is_interpolated()).count();
    round1(100.0 * real as f64 / points.len() as f64)
}

/// The last `days` days of a cached dataset ending on `end`, if it covers them.
fn window_of(dataset: Dataset, end: NaiveDate, days: u32) -> Option<Dataset> {
    // ---
    if dataset.end_date != end || dataset.points.len() < days as usize {
        return None;
    }

    let skip = dataset.points.len() - days as usize;
    let points: Vec<HistoricalPoint> = dataset.points.into_iter().skip(skip).collect();
    let start_date = points.first().map(|p| p.date)?;

    Some(Dataset {
        location: dataset.location,
        start_date,
        end_date: end,
        total_points: points.len(),
        completeness: completeness(&points),
        points,
    })
}

pub struct HistoricalCollector {
    ground: Option<Arc<dyn HistorySource>>,
    satellite: Option<Arc<dyn HistorySource>>,
    cache: Arc<dyn CacheStore>,
    ttl: chrono::Duration,
    timeout: Duration,
}

impl HistoricalCollector {
    // ---
    pub fn new(
        ground: Option<Arc<dyn HistorySource>>,
        satellite: Option<Arc<dyn HistorySource>>,
        cache: Arc<dyn CacheStore>,
        ttl: chrono::Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            ground,
            satellite,
            cache,
            ttl,
            timeout,
        }
    }

    /// Dataset for the `days` days ending today.
    pub async fn collect(
        &self,
        lat: f64,
        lng: f64,
        days: u32,
        city: Option<&str>,
        country: Option<&str>,
    ) -> Dataset {
        let now = Utc::now();
        self.collect_until(lat, lng, days, city, country, now.date_naive(), now)
            .await
    }

    /// Dataset for the `days` days ending on `end`, with `now` as the cache clock.
    #[allow(clippy::too_many_arguments)]
    pub async fn collect_until(
        &self,
        lat: f64,
        lng: f64,
        days: u32,
        city: Option<&str>,
        country: Option<&str>,
        end: NaiveDate,
        now: DateTime<Utc>,
    ) -> Dataset {
        // ---
        let key = dataset_cache_key(lat, lng);
        if days > MAX_HISTORY_DAYS {
            tracing::warn!("{} days requested for {}, capping at {}", days, key, MAX_HISTORY_DAYS);
        }
        let days = days.min(MAX_HISTORY_DAYS);

        match get_fresh::<Dataset>(self.cache.as_ref(), &key, self.ttl, now).await {
            Ok(Some(cached)) => match window_of(cached, end, days) {
                Some(dataset) => {
                    tracing::info!("using cached dataset {} ({} days)", key, days);
                    return dataset;
                }
                None => tracing::debug!("cached dataset {} does not cover {} days to {}", key, days, end),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!("dataset cache read failed: {}", e),
        }

        let start = end
            .checked_sub_signed(chrono::Duration::days(i64::from(days.max(1)) - 1))
            .unwrap_or(NaiveDate::MIN);
        tracing::info!("collecting {} days of history for {} ({} .. {})", days, key, start, end);

        let (ground, satellite) = tokio::join!(
            self.fetch(self.ground.as_deref(), lat, lng, start, end),
            self.fetch(self.satellite.as_deref(), lat, lng, start, end),
        );
        tracing::debug!("history sources: ground={} satellite={}", ground.len(), satellite.len());

        let known = merge(satellite, ground, start, end);
        let points = if days == 0 { Vec::new() } else { gap_fill(&known, start, days) };
        let completeness = completeness(&points);

        tracing::info!(
            "dataset {}: {} points, {} real, {:.1}% complete",
            key,
            points.len(),
            known.len(),
            completeness
        );

        let dataset = Dataset {
            location: Location {
                city: city.map(str::to_string).unwrap_or_else(|| coordinate_label(lat, lng)),
                country: country.unwrap_or("Unknown").to_string(),
                lat,
                lng,
            },
            start_date: start,
            end_date: end,
            total_points: points.len(),
            completeness,
            points,
        };

        if !dataset.is_empty() {
            if let Err(e) = put_value(self.cache.as_ref(), &key, &dataset, now).await {
                tracing::warn!("dataset cache write failed: {}", e);
            }
        }

        dataset
    }

    async fn fetch(
        &self,
        source: Option<&dyn HistorySource>,
        lat: f64,
        lng: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<HistoricalPoint> {
        // ---
        let Some(source) = source else {
            return Vec::new();
        };

        match bounded(self.timeout, source.daily_history(lat, lng, start, end)).await {
            Ok(points) => points,
            Err(e) => {
                let err = AirQualityError::ProviderUnavailable {
                    provider: source.name().to_string(),
                    reason: e.to_string(),
                };
                tracing::warn!("{}", err);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::cache::MemoryCache;
    use crate::models::PollutantLevels;
    use crate::providers::{ProviderError, ProviderResult};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn real(d: u32, index: f64, source: HistoricalSource) -> HistoricalPoint {
        let levels = PollutantLevels {
            pm25: index / 2.0,
            ..PollutantLevels::default()
        };
        HistoricalPoint::new(day(d), index, levels, source, 1.0)
    }

    struct FixedHistory {
        points: Vec<HistoricalPoint>,
        calls: AtomicUsize,
    }

    impl FixedHistory {
        fn new(points: Vec<HistoricalPoint>) -> Arc<Self> {
            Arc::new(Self {
                points,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl HistorySource for FixedHistory {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn daily_history(
            &self,
            _lat: f64,
            _lng: f64,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> ProviderResult<Vec<HistoricalPoint>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.points.clone())
        }
    }

    struct BrokenHistory;

    #[async_trait]
    impl HistorySource for BrokenHistory {
        fn name(&self) -> &str {
            "broken"
        }

        async fn daily_history(
            &self,
            _lat: f64,
            _lng: f64,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> ProviderResult<Vec<HistoricalPoint>> {
            Err(ProviderError::Api("down".into()))
        }
    }

    #[test]
    fn test_gap_fill_interpolates_by_elapsed_time() {
        // ---
        let values = [(1, 40.0), (2, 42.0), (3, 41.0), (4, 39.0), (5, 43.0), (8, 50.0), (9, 48.0), (10, 47.0)];
        let points = values
            .iter()
            .map(|(d, v)| real(*d, *v, HistoricalSource::Ground))
            .collect();
        let known = merge(Vec::new(), points, day(1), day(10));

        let filled = gap_fill(&known, day(1), 10);
        assert_eq!(filled.len(), 10);

        assert_eq!(filled[5].index, 45.3);
        assert_eq!(filled[6].index, 47.7);
        assert_eq!(filled[5].pollutants.pm25, 22.7);
        for p in &filled[5..7] {
            assert_eq!(p.source, HistoricalSource::Interpolated);
            assert_eq!(p.confidence, INTERPOLATED_CONFIDENCE);
        }
        assert_eq!(completeness(&filled), 80.0);
    }

    #[test]
    fn test_gap_fill_repeats_edges() {
        // ---
        let known = merge(
            Vec::new(),
            vec![real(3, 60.0, HistoricalSource::Ground)],
            day(1),
            day(5),
        );
        let filled = gap_fill(&known, day(1), 5);

        assert_eq!(filled.len(), 5);
        assert!(filled.iter().all(|p| p.index == 60.0));
        assert_eq!(filled[0].confidence, REPEATED_CONFIDENCE);
        assert_eq!(filled[4].confidence, REPEATED_CONFIDENCE);
        assert_eq!(filled[2].source, HistoricalSource::Ground);
        assert_eq!(filled[4].date, day(5));
    }

    #[test]
    fn test_merge_ground_overwrites_satellite() {
        // ---
        let merged = merge(
            vec![
                real(1, 100.0, HistoricalSource::Satellite),
                real(2, 100.0, HistoricalSource::Satellite),
                real(9, 100.0, HistoricalSource::Satellite),
            ],
            vec![real(2, 30.0, HistoricalSource::Ground)],
            day(1),
            day(5),
        );

        assert_eq!(merged.len(), 2, "out-of-window day dropped");
        assert_eq!(merged[&day(1)].source, HistoricalSource::Satellite);
        assert_eq!(merged[&day(2)].source, HistoricalSource::Ground);
        assert_eq!(merged[&day(2)].index, 30.0);
    }

    #[test]
    fn test_completeness_rounding() {
        // ---
        assert_eq!(completeness(&[]), 0.0);
        let known = merge(
            Vec::new(),
            vec![real(1, 10.0, HistoricalSource::Ground)],
            day(1),
            day(3),
        );
        assert_eq!(completeness(&gap_fill(&known, day(1), 3)), 33.3);
    }

    #[tokio::test]
    async fn test_collect_uses_cache_within_ttl() {
        // ---
        let ground = FixedHistory::new((1..=10).map(|d| real(d, 40.0, HistoricalSource::Ground)).collect());
        let collector = HistoricalCollector::new(
            Some(ground.clone()),
            None,
            Arc::new(MemoryCache::new()),
            chrono::Duration::hours(24),
            Duration::from_secs(1),
        );
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();

        let first = collector
            .collect_until(28.6, 77.2, 10, Some("Delhi"), None, day(10), now)
            .await;
        assert_eq!(first.total_points, 10);
        assert_eq!(first.completeness, 100.0);

        let shorter = collector
            .collect_until(28.6, 77.2, 7, None, None, day(10), now + chrono::Duration::hours(2))
            .await;
        assert_eq!(shorter.total_points, 7);
        assert_eq!(shorter.start_date, day(4));
        assert_eq!(shorter.location.city, "Delhi");
        assert_eq!(ground.calls.load(Ordering::SeqCst), 1);

        collector
            .collect_until(28.6, 77.2, 10, None, None, day(10), now + chrono::Duration::hours(25))
            .await;
        assert_eq!(ground.calls.load(Ordering::SeqCst), 2, "stale entry refetched");
    }

    #[tokio::test]
    async fn test_collect_without_data_is_empty() {
        // ---
        let collector = HistoricalCollector::new(
            Some(Arc::new(BrokenHistory)),
            None,
            Arc::new(MemoryCache::new()),
            chrono::Duration::hours(24),
            Duration::from_secs(1),
        );
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();

        let dataset = collector
            .collect_until(-75.0, 120.0, 30, None, None, day(10), now)
            .await;
        assert!(dataset.is_empty());
        assert_eq!(dataset.completeness, 0.0);
        assert_eq!(dataset.location.country, "Unknown");
    }

    #[tokio::test]
    async fn test_collect_caps_oversized_windows() {
        // ---
        let ground = FixedHistory::new(vec![real(1, 40.0, HistoricalSource::Ground)]);
        let collector = HistoricalCollector::new(
            Some(ground),
            None,
            Arc::new(MemoryCache::new()),
            chrono::Duration::hours(24),
            Duration::from_secs(1),
        );
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();

        let dataset = collector
            .collect_until(10.0, 10.0, u32::MAX, None, None, day(10), now)
            .await;
        assert_eq!(dataset.points.len(), MAX_HISTORY_DAYS as usize);
        assert_eq!(dataset.end_date, day(10));
        assert_eq!(
            dataset.start_date,
            day(10) - chrono::Duration::days(i64::from(MAX_HISTORY_DAYS) - 1)
        );

        let at_edge = collector
            .collect_until(10.0, 10.0, 30, None, None, NaiveDate::MIN, now)
            .await;
        assert_eq!(at_edge.start_date, NaiveDate::MIN);
    }
}
