//! Analytics endpoints, each computed over a freshly collected (or cached)
//! dataset:
//!
//! - `GET /analytics/weekly`
//! - `GET /analytics/monthly`
//! - `GET /analytics/yearly`
//! - `GET /analytics/pollutants`
//! - `GET /analytics/summary`
//!
//! All take `lat`, `lng` and an optional `days` window.

use axum::{extract::Query, extract::State, routing::get, Json, Router};
use serde::Deserialize;
use tracing::info;

use super::{check_days, check_point, ApiError, AppState};
use crate::analytics::{MonthlyAnalysis, PollutantTrend, QuickSummary, YearlyAnalysis};
use crate::history::MAX_HISTORY_DAYS;
use crate::models::{Dataset, HistoricalPoint};

const DEFAULT_DAYS: u32 = 365;
const MAX_DAYS: u32 = MAX_HISTORY_DAYS;

#[derive(Debug, Deserialize)]
struct AnalyticsQuery {
    lat: f64,
    lng: f64,
    days: Option<u32>,
}

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/analytics/weekly", get(weekly))
        .route("/analytics/monthly", get(monthly))
        .route("/analytics/yearly", get(yearly))
        .route("/analytics/pollutants", get(pollutants))
        .route("/analytics/summary", get(summary))
}

async fn dataset_for(service: &AppState, params: &AnalyticsQuery, default_days: u32) -> Result<Dataset, ApiError> {
    // ---
    check_point(params.lat, params.lng)?;
    let days = check_days(params.days, default_days, MAX_DAYS)?;

    Ok(service
        .get_historical_dataset(params.lat, params.lng, days, None, None)
        .await)
}

async fn weekly(
    Query(params): Query<AnalyticsQuery>,
    State(service): State<AppState>,
) -> Result<Json<Vec<HistoricalPoint>>, ApiError> {
    info!("GET /analytics/weekly {:.4},{:.4}", params.lat, params.lng);
    let dataset = dataset_for(&service, &params, 7).await?;
    Ok(Json(service.weekly_analysis(&dataset)))
}

async fn monthly(
    Query(params): Query<AnalyticsQuery>,
    State(service): State<AppState>,
) -> Result<Json<Vec<MonthlyAnalysis>>, ApiError> {
    info!("GET /analytics/monthly {:.4},{:.4}", params.lat, params.lng);
    let dataset = dataset_for(&service, &params, DEFAULT_DAYS).await?;
    Ok(Json(service.monthly_analysis(&dataset)?))
}

async fn yearly(
    Query(params): Query<AnalyticsQuery>,
    State(service): State<AppState>,
) -> Result<Json<Vec<YearlyAnalysis>>, ApiError> {
    info!("GET /analytics/yearly {:.4},{:.4}", params.lat, params.lng);
    let dataset = dataset_for(&service, &params, DEFAULT_DAYS).await?;
    Ok(Json(service.yearly_analysis(&dataset)?))
}

async fn pollutants(
    Query(params): Query<AnalyticsQuery>,
    State(service): State<AppState>,
) -> Result<Json<Vec<PollutantTrend>>, ApiError> {
    info!("GET /analytics/pollutants {:.4},{:.4}", params.lat, params.lng);
    let dataset = dataset_for(&service, &params, 60).await?;
    Ok(Json(service.pollutant_trends(&dataset)?))
}

async fn summary(
    Query(params): Query<AnalyticsQuery>,
    State(service): State<AppState>,
) -> Result<Json<QuickSummary>, ApiError> {
    info!("GET /analytics/summary {:.4},{:.4}", params.lat, params.lng);
    let dataset = dataset_for(&service, &params, DEFAULT_DAYS).await?;
    Ok(Json(service.quick_summary(&dataset)?))
}
