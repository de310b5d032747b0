//! Current-conditions endpoints.
//!
//! - `GET /readings/current?lat&lng[&city]`
//! - `GET /readings/search?q`
//! - `GET /readings/hourly?lat&lng`

use axum::{extract::Query, extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{check_point, ApiError, AppState};
use crate::forecast::hourly_outlook;
use crate::models::Reading;

#[derive(Debug, Deserialize)]
struct CurrentQuery {
    lat: f64,
    lng: f64,
    city: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
}

#[derive(Serialize)]
struct HourlyResponse {
    reading: Reading,
    hourly: Vec<u16>,
}

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/readings/current", get(current))
        .route("/readings/search", get(search))
        .route("/readings/hourly", get(hourly))
}

async fn current(
    Query(params): Query<CurrentQuery>,
    State(service): State<AppState>,
) -> Result<Json<Reading>, ApiError> {
    // ---
    info!("GET /readings/current {:.4},{:.4}", params.lat, params.lng);
    check_point(params.lat, params.lng)?;

    let reading = service
        .get_current_reading(params.lat, params.lng, params.city.as_deref())
        .await?;
    Ok(Json(reading))
}

async fn search(
    Query(params): Query<SearchQuery>,
    State(service): State<AppState>,
) -> Result<Json<Reading>, ApiError> {
    // ---
    let query = params.q.trim();
    info!("GET /readings/search '{}'", query);
    if query.is_empty() {
        return Err(ApiError::BadRequest("search query is empty".to_string()));
    }

    Ok(Json(service.search_reading(query).await?))
}

async fn hourly(
    Query(params): Query<CurrentQuery>,
    State(service): State<AppState>,
) -> Result<Json<HourlyResponse>, ApiError> {
    // ---
    info!("GET /readings/hourly {:.4},{:.4}", params.lat, params.lng);
    check_point(params.lat, params.lng)?;

    let reading = service
        .get_current_reading(params.lat, params.lng, params.city.as_deref())
        .await?;
    let hourly = hourly_outlook(reading.index);
    Ok(Json(HourlyResponse { reading, hourly }))
}
