//! Domain error taxonomy.
//!
//! Provider and training failures are absorbed inside the engines and only
//! show up here for logging. `NoDataAvailable` and `InsufficientHistory` are
//! the two conditions that reach a caller, and their messages are written to
//! be shown to a user as-is.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AirQualityError {
    #[error("provider {provider} unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error(
        "No air quality data available near {lat:.4}, {lng:.4}: no provider returned data for \
         this point and no monitoring station was found within {}. Try a major city.",
        format_radii(.radii_km)
    )]
    NoDataAvailable {
        lat: f64,
        lng: f64,
        radii_km: Vec<u32>,
    },

    #[error("insufficient history for {context}: need at least {required} days, have {available}")]
    InsufficientHistory {
        required: usize,
        available: usize,
        context: String,
    },

    #[error("{0}")]
    LocationNotFound(String),

    #[error("model training failed: {0}")]
    TrainingFailure(String),

    #[error("cache error: {0}")]
    Cache(String),
}

pub type Result<T> = std::result::Result<T, AirQualityError>;

fn format_radii(radii: &[u32]) -> String {
    radii
        .iter()
        .map(|r| format!("{r}km"))
        .collect::<Vec<_>>()
        .join(" or ")
}

impl AirQualityError {
    // ---
    pub fn insufficient(required: usize, available: usize, context: impl Into<String>) -> Self {
        AirQualityError::InsufficientHistory {
            required,
            available,
            context: context.into(),
        }
    }
}
