//! `airfusion`: multi-source air-quality fusion, history, analytics and
//! forecasting.
//!
//! Gateway module (EMBP). Children are declared here and the types a caller
//! needs are re-exported, so binaries and integration tests depend on
//! `airfusion::X` rather than on the internal layout.

pub mod analytics;
pub mod aqi;
pub mod cache;
pub mod error;
pub mod forecast;
pub mod fusion;
pub mod geo;
pub mod history;
pub mod models;
pub mod providers;
pub mod routes;
pub mod schema;
pub mod service;

pub use cache::{CacheEntry, CacheStore, MemoryCache, PgCacheStore};
pub use error::{AirQualityError, Result};
pub use forecast::{ForecastResult, ModelInfo, ProgressCallback, TrainingConfig, TrainingProgress};
pub use fusion::FusionSources;
pub use geo::LocationKey;
pub use models::{
    Dataset, HistoricalPoint, HistoricalSource, Location, Pollutant, PollutantKey, PollutantLevels,
    Prediction, Provenance, Reading, Trend,
};
pub use service::{Adapters, AirQualityService, ServiceSettings};
