//! HTTP surface: boot the router on an ephemeral port and drive it with a
//! real client.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use airfusion::providers::HistorySource;
use airfusion::{routes, Adapters, FusionSources};

use common::{all_sources, daily_series, service, FixedCurrent, FixedHistory};

async fn spawn_app(adapters: Adapters) -> Result<String> {
    // ---
    let app = routes::router(Arc::new(service(adapters)));
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Ok(format!("http://{}", addr))
}

#[tokio::test]
async fn health_reports_ok() -> Result<()> {
    // ---
    let base = spawn_app(Adapters::default()).await?;

    let body: Value = Client::new()
        .get(format!("{}/health", base))
        .send()
        .await?
        .json()
        .await?;

    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
    Ok(())
}

#[tokio::test]
async fn current_reading_carries_provenance_and_confidence() -> Result<()> {
    // ---
    let base = spawn_app(Adapters {
        fusion: all_sources(),
        ..Adapters::default()
    })
    .await?;

    let response = Client::new()
        .get(format!("{}/readings/current?lat=28.61&lng=77.21", base))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_eq!(body["provenance"], "premium-ground");
    assert_eq!(body["confidence"], 92);
    assert_eq!(body["index"], 42);
    Ok(())
}

#[tokio::test]
async fn missing_data_answers_not_found_with_message() -> Result<()> {
    // ---
    let base = spawn_app(Adapters::default()).await?;

    let response = Client::new()
        .get(format!("{}/readings/current?lat=-75&lng=120", base))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body: Value = response.json().await?;
    let message = body["error"].as_str().unwrap_or_default();
    assert!(message.contains("100km"), "unexpected message: {message}");
    Ok(())
}

#[tokio::test]
async fn out_of_range_coordinates_are_rejected() -> Result<()> {
    // ---
    let base = spawn_app(Adapters::default()).await?;

    let response = Client::new()
        .get(format!("{}/readings/current?lat=95&lng=0", base))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn short_history_is_unprocessable_for_analytics() -> Result<()> {
    // ---
    let today = Utc::now().date_naive();
    let ground: Arc<dyn HistorySource> = Arc::new(FixedHistory(daily_series(today, 3)));
    let base = spawn_app(Adapters {
        ground_history: Some(ground),
        ..Adapters::default()
    })
    .await?;

    let response = Client::new()
        .get(format!("{}/analytics/monthly?lat=51.5&lng=-0.12&days=3", base))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    Ok(())
}

#[tokio::test]
async fn forecast_endpoint_returns_requested_days() -> Result<()> {
    // ---
    let base = spawn_app(Adapters {
        fusion: FusionSources {
            premium: Some(FixedCurrent::ok("premium", 88)),
            ..FusionSources::default()
        },
        ..Adapters::default()
    })
    .await?;

    let response = Client::new()
        .get(format!("{}/forecast?lat=28.61&lng=77.21&days=4&trained=false", base))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_eq!(body["current"]["index"], 88);
    assert_eq!(body["predictions"].as_array().map(Vec::len), Some(4));
    assert_eq!(body["model_info"]["is_real_ml"], false);
    assert_eq!(body["needs_training"], false);
    Ok(())
}
