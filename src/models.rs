//! Data models shared by the fusion, history, analytics and forecast engines.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::aqi::{self, AqiCategory};

// ---

/// Which source(s) produced a [`Reading`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    PremiumGround,
    GroundStation,
    Satellite,
    Aggregator,
    Hybrid,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::PremiumGround => "premium-ground",
            Provenance::GroundStation => "ground-station",
            Provenance::Satellite => "satellite",
            Provenance::Aggregator => "aggregator",
            Provenance::Hybrid => "hybrid",
        }
    }
}

/// One pollutant measurement inside a reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pollutant {
    pub name: String,
    pub concentration: f64,
    pub unit: String,
}

impl Pollutant {
    pub fn new(name: impl Into<String>, concentration: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            concentration,
            unit: unit.into(),
        }
    }
}

/// Weather snapshot reported alongside some readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub wind_direction_deg: Option<f64>,
}

/// Named point on the globe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub country: String,
    pub lat: f64,
    pub lng: f64,
}

/// A single fused, point-in-time air-quality observation.
///
/// Built once per fusion request and never modified afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub location: Location,
    /// Index on the 0–500 scale, always clamped.
    pub index: u16,
    pub category: AqiCategory,
    pub summary: String,
    pub health_advisory: Vec<String>,
    pub pollutants: Vec<Pollutant>,
    pub weather: Option<Weather>,
    pub provenance: Provenance,
    /// 0–100.
    pub confidence: u8,
    /// Distance to the station whose values were borrowed, when not exact.
    pub nearest_station_distance_km: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    // ---
    pub fn new(
        location: Location,
        index: u16,
        pollutants: Vec<Pollutant>,
        weather: Option<Weather>,
        provenance: Provenance,
        confidence: u8,
        timestamp: DateTime<Utc>,
    ) -> Self {
        // ---
        let index = index.min(aqi::MAX_INDEX);
        let category = AqiCategory::from_index(index);

        Reading {
            location,
            index,
            category,
            summary: category.summary().to_string(),
            health_advisory: category.health_advisory(),
            pollutants,
            weather,
            provenance,
            confidence: confidence.min(100),
            nearest_station_distance_km: None,
            timestamp,
        }
    }

    /// Attach the borrowed-station distance and note it in the summary.
    pub fn with_station_distance(mut self, distance_km: f64) -> Self {
        self.summary = format!(
            "{} (Data from nearest station {:.1}km away)",
            self.summary, distance_km
        );
        self.nearest_station_distance_km = Some(distance_km);
        self
    }
}

/// Origin of one day in a historical series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoricalSource {
    Ground,
    Satellite,
    Aggregator,
    Interpolated,
    /// Placeholder for a day missing from the series.
    #[serde(rename = "N/A")]
    Unavailable,
}

/// The six pollutants tracked per historical day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollutantKey {
    Pm25,
    Pm10,
    O3,
    No2,
    So2,
    Co,
}

impl PollutantKey {
    pub const ALL: [PollutantKey; 6] = [
        PollutantKey::Pm25,
        PollutantKey::Pm10,
        PollutantKey::O3,
        PollutantKey::No2,
        PollutantKey::So2,
        PollutantKey::Co,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PollutantKey::Pm25 => "PM2.5",
            PollutantKey::Pm10 => "PM10",
            PollutantKey::O3 => "O3",
            PollutantKey::No2 => "NO2",
            PollutantKey::So2 => "SO2",
            PollutantKey::Co => "CO",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            PollutantKey::Co => "mg/m³",
            _ => "µg/m³",
        }
    }

    /// Match a provider parameter name ("pm25", "pm2.5", "ozone", ...).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "pm25" | "pm2.5" | "pm2_5" => Some(PollutantKey::Pm25),
            "pm10" => Some(PollutantKey::Pm10),
            "o3" | "ozone" => Some(PollutantKey::O3),
            "no2" => Some(PollutantKey::No2),
            "so2" => Some(PollutantKey::So2),
            "co" => Some(PollutantKey::Co),
            _ => None,
        }
    }
}

/// Daily pollutant averages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PollutantLevels {
    pub pm25: f64,
    pub pm10: f64,
    pub o3: f64,
    pub no2: f64,
    pub so2: f64,
    pub co: f64,
}

impl PollutantLevels {
    // ---
    pub fn get(&self, key: PollutantKey) -> f64 {
        match key {
            PollutantKey::Pm25 => self.pm25,
            PollutantKey::Pm10 => self.pm10,
            PollutantKey::O3 => self.o3,
            PollutantKey::No2 => self.no2,
            PollutantKey::So2 => self.so2,
            PollutantKey::Co => self.co,
        }
    }

    pub fn set(&mut self, key: PollutantKey, value: f64) {
        match key {
            PollutantKey::Pm25 => self.pm25 = value,
            PollutantKey::Pm10 => self.pm10 = value,
            PollutantKey::O3 => self.o3 = value,
            PollutantKey::No2 => self.no2 = value,
            PollutantKey::So2 => self.so2 = value,
            PollutantKey::Co => self.co = value,
        }
    }

    /// Apply `f` to every pollutant pair-wise.
    pub fn combine(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        let mut out = PollutantLevels::default();
        for key in PollutantKey::ALL {
            out.set(key, f(self.get(key), other.get(key)));
        }
        out
    }
}

/// One calendar day's aggregate for a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    pub date: NaiveDate,
    /// Start of `date` in UTC.
    pub timestamp: DateTime<Utc>,
    pub index: f64,
    #[serde(flatten)]
    pub pollutants: PollutantLevels,
    pub source: HistoricalSource,
    /// 0.0–1.0; a different scale from [`Reading::confidence`].
    pub confidence: f64,
}

impl HistoricalPoint {
    // ---
    pub fn new(
        date: NaiveDate,
        index: f64,
        pollutants: PollutantLevels,
        source: HistoricalSource,
        confidence: f64,
    ) -> Self {
        HistoricalPoint {
            date,
            timestamp: start_of_day(date),
            index,
            pollutants,
            source,
            confidence,
        }
    }

    pub fn is_interpolated(&self) -> bool {
        self.source == HistoricalSource::Interpolated
    }

    /// Fixed-order feature vector `[index, PM2.5, PM10, O3, NO2, SO2, CO]`.
    pub fn features(&self) -> [f64; 7] {
        let p = &self.pollutants;
        [self.index, p.pm25, p.pm10, p.o3, p.no2, p.so2, p.co]
    }
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// A complete, gap-filled historical series for one location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub location: Location,
    /// Ascending by date, one point per day.
    pub points: Vec<HistoricalPoint>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_points: usize,
    /// Percentage of points that are not interpolated, 1 decimal.
    pub completeness: f64,
}

impl Dataset {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn real_points(&self) -> usize {
        self.points.iter().filter(|p| !p.is_interpolated()).count()
    }
}

/// Direction of change for an index series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Worsening,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Improving => "improving",
            Trend::Stable => "stable",
            Trend::Worsening => "worsening",
        }
    }
}

/// Direction of change for a pollutant concentration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Stable,
}

/// One future day's forecast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub date: NaiveDate,
    pub predicted_index: u16,
    /// 0–100, non-increasing across a forecast.
    pub confidence: u8,
    pub trend: Trend,
    pub factors: Vec<String>,
    /// ± index units, reported by the trained forecaster only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<u16>,
}
