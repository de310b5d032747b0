//! `GET /history?lat&lng[&days][&city][&country]`: the gap-filled dataset.

use axum::{extract::Query, extract::State, routing::get, Json, Router};
use serde::Deserialize;
use tracing::info;

use super::{check_days, check_point, ApiError, AppState};
use crate::history::MAX_HISTORY_DAYS;
use crate::models::Dataset;

const DEFAULT_DAYS: u32 = 30;
const MAX_DAYS: u32 = MAX_HISTORY_DAYS;

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    lat: f64,
    lng: f64,
    days: Option<u32>,
    city: Option<String>,
    country: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/history", get(handler))
}

async fn handler(
    Query(params): Query<HistoryQuery>,
    State(service): State<AppState>,
) -> Result<Json<Dataset>, ApiError> {
    // ---
    check_point(params.lat, params.lng)?;
    let days = check_days(params.days, DEFAULT_DAYS, MAX_DAYS)?;
    info!("GET /history {:.4},{:.4} days={}", params.lat, params.lng, days);

    let dataset = service
        .get_historical_dataset(
            params.lat,
            params.lng,
            days,
            params.city.as_deref(),
            params.country.as_deref(),
        )
        .await;
    Ok(Json(dataset))
}
