//! `GET /forecast?lat&lng[&days][&trained]`
//!
//! Fuses the current reading first; the forecast itself never fails, but a
//! point with no reading at all still answers 404.

use std::sync::Arc;

use axum::{extract::Query, extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{check_days, check_point, ApiError, AppState};
use crate::forecast::{ForecastResult, ProgressCallback, TrainingProgress};
use crate::models::Reading;

const DEFAULT_DAYS: u32 = 7;
const MAX_DAYS: u32 = 30;

#[derive(Debug, Deserialize)]
struct ForecastQuery {
    lat: f64,
    lng: f64,
    days: Option<u32>,
    trained: Option<bool>,
}

#[derive(Serialize)]
struct ForecastResponse {
    current: Reading,
    #[serde(flatten)]
    forecast: ForecastResult,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/forecast", get(handler))
}

async fn handler(
    Query(params): Query<ForecastQuery>,
    State(service): State<AppState>,
) -> Result<Json<ForecastResponse>, ApiError> {
    // ---
    check_point(params.lat, params.lng)?;
    let days = check_days(params.days, DEFAULT_DAYS, MAX_DAYS)?;
    let trained = params.trained.unwrap_or(true);
    info!(
        "GET /forecast {:.4},{:.4} days={} trained={}",
        params.lat, params.lng, days, trained
    );

    let current = service
        .get_current_reading(params.lat, params.lng, None)
        .await?;

    let progress: ProgressCallback = Arc::new(|p: TrainingProgress| {
        if p.epoch == p.total_epochs || p.epoch % 10 == 0 {
            debug!(
                "training {}/{}: accuracy {:.1}%",
                p.epoch, p.total_epochs, p.accuracy
            );
        }
    });

    let forecast = service
        .get_forecast(params.lat, params.lng, &current, days, trained, Some(progress))
        .await;

    Ok(Json(ForecastResponse { current, forecast }))
}
