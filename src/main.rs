//! Application entry point for the `airfusion` service.
//!
//! Startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Connecting the PostgreSQL dataset cache when `DATABASE_URL` is set,
//!   otherwise falling back to an in-memory cache
//! - Building one adapter per configured provider
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//! - Binding the Axum HTTP server and serving requests
//!
//! # Environment Variables
//! - `AIRFUSION_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AIRFUSION_SPAN_EVENTS` (optional) – span event mode for tracing
//! - everything else is documented on [`config::load_from_env`]
use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::Router;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use airfusion::providers::{
    http_client, CurrentSource, Geocoder, GroundNetwork, HistorySource, IqAirClient,
    NasaPowerClient, NominatimClient, OpenAqClient, StationSearch, WaqiClient,
};
use airfusion::{
    routes, schema, Adapters, AirQualityService, CacheStore, FusionSources, MemoryCache,
    PgCacheStore,
};

mod config;

pub use config::Config;

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let cache = connect_cache(&cfg).await?;
    let adapters = build_adapters(&cfg);
    let service = Arc::new(AirQualityService::new(adapters, cache, cfg.service_settings()));

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(service);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.listen_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Postgres-backed cache when configured, in-memory otherwise.
async fn connect_cache(cfg: &Config) -> Result<Arc<dyn CacheStore>> {
    // ---
    let Some(db_url) = cfg.db_url.as_deref() else {
        tracing::info!("DATABASE_URL not set, using in-memory dataset cache");
        return Ok(Arc::new(MemoryCache::new()));
    };

    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;
    Ok(Arc::new(PgCacheStore::new(pool)))
}

/// One adapter per provider. Keyed providers without a key are left out.
fn build_adapters(cfg: &Config) -> Adapters {
    // ---
    let client = http_client(cfg.provider_timeout());

    let premium = cfg
        .iqair_api_key
        .clone()
        .map(|key| Arc::new(IqAirClient::new(client.clone(), Some(key))));
    let openaq = cfg
        .openaq_api_key
        .clone()
        .map(|key| Arc::new(OpenAqClient::new(client.clone(), Some(key))));
    let waqi = cfg
        .waqi_api_key
        .clone()
        .map(|token| Arc::new(WaqiClient::new(client.clone(), Some(token))));
    let nasa = Arc::new(NasaPowerClient::new(client.clone()));
    let nominatim = Arc::new(NominatimClient::new(client));

    tracing::info!(
        "providers: premium={} ground={} aggregator={} satellite=on geocoder=on",
        premium.is_some(),
        openaq.is_some(),
        waqi.is_some()
    );

    Adapters {
        fusion: FusionSources {
            premium: premium.map(|p| p as Arc<dyn CurrentSource>),
            ground: openaq.clone().map(|o| o as Arc<dyn GroundNetwork>),
            satellite: Some(nasa.clone() as Arc<dyn CurrentSource>),
            aggregator: waqi.clone().map(|w| w as Arc<dyn CurrentSource>),
            station_search: waqi.map(|w| w as Arc<dyn StationSearch>),
            geocoder: Some(nominatim as Arc<dyn Geocoder>),
        },
        ground_history: openaq.map(|o| o as Arc<dyn HistorySource>),
        satellite_history: Some(nasa as Arc<dyn HistorySource>),
    }
}

/// Initialize the global tracing subscriber for structured logging.
///
/// - Colour: `FORCE_COLOR=1|true|yes` forces it on, `0|false|no` off,
///   otherwise TTY detection
/// - Span events via `AIRFUSION_SPAN_EVENTS`:
///   - `"full"`       : ENTER, EXIT and CLOSE with timing
///   - `"enter_exit"` : ENTER and EXIT only
///   - unset or other values: CLOSE only (default)
/// - Level via `RUST_LOG` when set, else `AIRFUSION_LOG_LEVEL`
///
/// Call once at startup, before any logging macro.
fn init_tracing() {
    // ---
    let span_events = match env::var("AIRFUSION_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to AIRFUSION_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AIRFUSION_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,reqwest=info,hyper_util=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
