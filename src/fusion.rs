//! Fusion engine: one best-available [`Reading`] per coordinate pair.
//!
//! All adapters are dispatched at once and awaited together; a slow or
//! failing adapter only removes itself from the candidate list. Selection is
//! a left fold over candidates laid out in priority order, so the order lives
//! in data ([`FusionEngine::candidates`]) rather than in branching.
//!
//! Pipeline:
//! 1. fan out to premium, ground network, satellite, aggregator and geocoder
//! 2. pick the first present candidate (premium > ground > satellite > aggregator)
//! 3. a satellite primary is upgraded to `hybrid` when a ground station sits
//!    within 50 km
//! 4. with no candidate at all, widen a nearest-station search 50 km → 100 km
//! 5. otherwise fail with `NoDataAvailable`

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::aqi::{ground_station_index, GroundIndexBasis};
use crate::error::{AirQualityError, Result};
use crate::geo::coordinate_label;
use crate::models::{Location, Pollutant, Provenance, Reading};
use crate::providers::{
    bounded, CurrentSource, Geocoder, GroundNetwork, GroundStation, NearbyStation, ProviderResult,
    SourceReading, StationSearch,
};

pub const PREMIUM_CONFIDENCE: u8 = 92;
pub const GROUND_PM25_CONFIDENCE: u8 = 95;
pub const GROUND_OTHER_CONFIDENCE: u8 = 90;
pub const SATELLITE_CONFIDENCE: u8 = 70;
pub const AGGREGATOR_PM25_CONFIDENCE: u8 = 85;
pub const AGGREGATOR_CONFIDENCE: u8 = 80;
pub const HYBRID_CONFIDENCE: u8 = 90;

/// Radius within which a ground station may replace a satellite estimate.
pub const HYBRID_RADIUS_KM: f64 = 50.0;

/// Widening radii for the nearest-station fallback.
pub const FALLBACK_RADII_KM: [u32; 2] = [50, 100];

/// Radius handed to the ground network on the initial fan-out.
const GROUND_SEARCH_RADIUS_KM: f64 = 50.0;

/// One source's contribution, tagged with provenance and confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCandidate {
    pub kind: Provenance,
    pub reading: SourceReading,
    pub confidence: u8,
}

/// Adapters the engine draws on. Any of them may be absent.
#[derive(Clone, Default)]
pub struct FusionSources {
    pub premium: Option<Arc<dyn CurrentSource>>,
    pub ground: Option<Arc<dyn GroundNetwork>>,
    pub satellite: Option<Arc<dyn CurrentSource>>,
    pub aggregator: Option<Arc<dyn CurrentSource>>,
    pub station_search: Option<Arc<dyn StationSearch>>,
    pub geocoder: Option<Arc<dyn Geocoder>>,
}

// ---

/// First present candidate wins.
pub fn select_primary<I>(candidates: I) -> Option<SourceCandidate>
where
    I: IntoIterator<Item = Option<SourceCandidate>>,
{
    candidates
        .into_iter()
        .fold(None, |chosen, next| chosen.or(next))
}

/// Confidence for a reading borrowed from a station `distance_km` away.
pub fn distance_confidence(distance_km: f64) -> u8 {
    let penalty = (distance_km.max(0.0) / 2.0).floor();
    (85.0 - penalty).max(50.0) as u8
}

/// Candidate from the nearest reporting ground station.
pub fn ground_candidate(stations: &[GroundStation]) -> Option<SourceCandidate> {
    // ---
    let station = stations.first()?;
    let (index, basis) = ground_station_index(station.measurement("pm25"), station.measurement("pm10"));
    let confidence = match basis {
        GroundIndexBasis::Pm25 => GROUND_PM25_CONFIDENCE,
        GroundIndexBasis::Pm10 | GroundIndexBasis::Default => GROUND_OTHER_CONFIDENCE,
    };

    let pollutants = station
        .measurements
        .iter()
        .map(|m| Pollutant::new(m.parameter.to_uppercase(), m.value, m.unit.clone()))
        .collect();

    Some(SourceCandidate {
        kind: Provenance::GroundStation,
        reading: SourceReading {
            index,
            pollutants,
            weather: None,
            station: Some(station.name.clone()),
            city: None,
        },
        confidence,
    })
}

/// Candidate from the community aggregator.
pub fn aggregator_candidate(reading: SourceReading) -> SourceCandidate {
    let reports_pm25 = reading
        .pollutants
        .iter()
        .any(|p| matches!(p.name.to_lowercase().as_str(), "pm25" | "pm2.5"));

    SourceCandidate {
        kind: Provenance::Aggregator,
        reading,
        confidence: if reports_pm25 {
            AGGREGATOR_PM25_CONFIDENCE
        } else {
            AGGREGATOR_CONFIDENCE
        },
    }
}

fn absorb<T>(provider: &str, result: ProviderResult<Option<T>>) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(e) => {
            let err = AirQualityError::ProviderUnavailable {
                provider: provider.to_string(),
                reason: e.to_string(),
            };
            tracing::warn!("{}", err);
            None
        }
    }
}

pub struct FusionEngine {
    sources: FusionSources,
    timeout: Duration,
}

impl FusionEngine {
    // ---
    pub fn new(sources: FusionSources, timeout: Duration) -> Self {
        Self { sources, timeout }
    }

    /// Produce exactly one reading for `(lat, lng)` or `NoDataAvailable`.
    pub async fn fuse(&self, lat: f64, lng: f64, city_hint: Option<&str>) -> Result<Reading> {
        // ---
        tracing::info!("fusing air quality for {:.4}, {:.4}", lat, lng);

        let (premium, ground, satellite, aggregator, naming) = tokio::join!(
            self.fetch_current(self.sources.premium.as_deref(), lat, lng),
            self.fetch_ground(lat, lng),
            self.fetch_current(self.sources.satellite.as_deref(), lat, lng),
            self.fetch_current(self.sources.aggregator.as_deref(), lat, lng),
            self.resolve_name(lat, lng, city_hint),
        );

        tracing::debug!(
            "sources available: premium={} ground={} satellite={} aggregator={}",
            premium.is_some(),
            !ground.is_empty(),
            satellite.is_some(),
            aggregator.is_some()
        );

        let candidates = Self::candidates(premium, &ground, satellite, aggregator);
        let (mut location, resolved) = naming;

        if let Some(primary) = select_primary(candidates) {
            tracing::info!(
                "primary source: {} (confidence {})",
                primary.kind.as_str(),
                primary.confidence
            );
            if !resolved {
                if let Some(city) = primary.reading.city.clone() {
                    location.city = city;
                }
            }

            if primary.kind == Provenance::Satellite {
                if let Some(station) = self.nearest_station(lat, lng, HYBRID_RADIUS_KM).await {
                    tracing::info!(
                        "upgrading satellite estimate with ground station {:.1}km away",
                        station.distance_km
                    );
                    return Ok(hybrid_reading(location, station, HYBRID_CONFIDENCE));
                }
            }

            return Ok(Reading::new(
                location,
                primary.reading.index,
                primary.reading.pollutants,
                primary.reading.weather,
                primary.kind,
                primary.confidence,
                Utc::now(),
            ));
        }

        tracing::warn!("no data at exact coordinates, searching for nearest station");

        for radius in FALLBACK_RADII_KM {
            if let Some(station) = self.nearest_station(lat, lng, radius as f64).await {
                tracing::info!(
                    "found nearest station {:.1}km away (radius {}km)",
                    station.distance_km,
                    radius
                );
                let confidence = distance_confidence(station.distance_km);
                return Ok(hybrid_reading(location, station, confidence));
            }
        }

        let err = AirQualityError::NoDataAvailable {
            lat,
            lng,
            radii_km: FALLBACK_RADII_KM.to_vec(),
        };
        tracing::error!("{}", err);
        Err(err)
    }

    /// Candidates in priority order.
    fn candidates(
        premium: Option<SourceReading>,
        ground: &[GroundStation],
        satellite: Option<SourceReading>,
        aggregator: Option<SourceReading>,
    ) -> [Option<SourceCandidate>; 4] {
        [
            premium.map(|reading| SourceCandidate {
                kind: Provenance::PremiumGround,
                reading,
                confidence: PREMIUM_CONFIDENCE,
            }),
            ground_candidate(ground),
            satellite.map(|reading| SourceCandidate {
                kind: Provenance::Satellite,
                reading,
                confidence: SATELLITE_CONFIDENCE,
            }),
            aggregator.map(aggregator_candidate),
        ]
    }

    async fn fetch_current(
        &self,
        source: Option<&dyn CurrentSource>,
        lat: f64,
        lng: f64,
    ) -> Option<SourceReading> {
        let source = source?;
        absorb(source.name(), bounded(self.timeout, source.current(lat, lng)).await)
    }

    async fn fetch_ground(&self, lat: f64, lng: f64) -> Vec<GroundStation> {
        // ---
        let Some(network) = self.sources.ground.as_deref() else {
            return Vec::new();
        };
        let result = bounded(
            self.timeout,
            network.stations(lat, lng, GROUND_SEARCH_RADIUS_KM),
        )
        .await
        .map(Some);

        absorb(network.name(), result).unwrap_or_default()
    }

    async fn nearest_station(&self, lat: f64, lng: f64, radius_km: f64) -> Option<NearbyStation> {
        let search = self.sources.station_search.as_deref()?;
        absorb(
            search.name(),
            bounded(self.timeout, search.nearest(lat, lng, radius_km)).await,
        )
    }

    /// Location label for the reading. The flag is false when the name is a
    /// coordinate fallback.
    async fn resolve_name(&self, lat: f64, lng: f64, city_hint: Option<&str>) -> (Location, bool) {
        // ---
        let located = |city: String, country: String| Location { city, country, lat, lng };

        if let Some(city) = city_hint {
            return (located(city.to_string(), String::new()), true);
        }

        if let Some(geocoder) = self.sources.geocoder.as_deref() {
            match bounded(self.timeout, geocoder.reverse(lat, lng)).await {
                Ok(place) => return (located(place.city, place.country), true),
                Err(e) => tracing::warn!("reverse geocoding failed: {}", e),
            }
        }

        (located(coordinate_label(lat, lng), "Unknown".to_string()), false)
    }
}

fn hybrid_reading(location: Location, station: NearbyStation, confidence: u8) -> Reading {
    Reading::new(
        location,
        station.reading.index,
        station.reading.pollutants,
        station.reading.weather,
        Provenance::Hybrid,
        confidence,
        Utc::now(),
    )
    .with_station_distance(station.distance_km)
}
