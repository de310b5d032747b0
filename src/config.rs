//! Configuration loader for the `airfusion` service.
//!
//! Centralizes every runtime setting and its default, loading from
//! environment variables (with optional `.env` support provided by the
//! caller). Nothing else in the binary reads `env::var` for settings.
use std::env;
use std::time::Duration;

use airfusion::history::MAX_HISTORY_DAYS;
use airfusion::{ServiceSettings, TrainingConfig};
use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read an optional, non-empty string environment variable.
macro_rules! optional_env {
    ($var_name:expr) => {
        env::var($var_name).ok().filter(|v| !v.trim().is_empty())
    };
}

/// Strongly typed application configuration.
///
/// Immutable after loading.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string; absent means an in-memory cache.
    pub db_url: Option<String>,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    pub listen_port: u16,

    pub iqair_api_key: Option<String>,
    pub openaq_api_key: Option<String>,
    pub waqi_api_key: Option<String>,

    /// Per-adapter request deadline.
    pub provider_timeout_secs: u32,

    /// Days of history collected to train a forecaster.
    pub history_days: u32,

    pub cache_ttl_hours: u32,
    pub training_epochs: u32,
    pub model_registry_capacity: u32,
}

/// Load configuration from environment variables with defaults.
///
/// All optional:
/// - `DATABASE_URL` – PostgreSQL connection string (default: in-memory cache)
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `LISTEN_PORT` – HTTP port (default: 8080)
/// - `IQAIR_API_KEY`, `OPENAQ_API_KEY`, `WAQI_API_KEY` – adapter keys; an
///   adapter without its key is disabled
/// - `PROVIDER_TIMEOUT_SECS` (default: 15)
/// - `HISTORY_DAYS` (default: 180, 1..=730)
/// - `CACHE_TTL_HOURS` (default: 24)
/// - `TRAINING_EPOCHS` (default: 50)
/// - `MODEL_REGISTRY_CAPACITY` (default: 64)
///
/// Returns an error if any numeric variable is present but invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let listen_port = parse_env_u32!("LISTEN_PORT", 8080);
    let listen_port = u16::try_from(listen_port)
        .map_err(|_| anyhow!("Invalid LISTEN_PORT: {} is out of range", listen_port))?;

    let provider_timeout_secs = parse_env_u32!("PROVIDER_TIMEOUT_SECS", 15);
    if provider_timeout_secs == 0 {
        return Err(anyhow!("Invalid PROVIDER_TIMEOUT_SECS: must be at least 1"));
    }

    let history_days = check_history_days(parse_env_u32!("HISTORY_DAYS", 180))?;

    Ok(Config {
        db_url: optional_env!("DATABASE_URL"),
        db_pool_max: parse_env_u32!("DB_POOL_MAX", 5),
        listen_port,
        iqair_api_key: optional_env!("IQAIR_API_KEY"),
        openaq_api_key: optional_env!("OPENAQ_API_KEY"),
        waqi_api_key: optional_env!("WAQI_API_KEY"),
        provider_timeout_secs,
        history_days,
        cache_ttl_hours: parse_env_u32!("CACHE_TTL_HOURS", 24),
        training_epochs: parse_env_u32!("TRAINING_EPOCHS", 50),
        model_registry_capacity: parse_env_u32!("MODEL_REGISTRY_CAPACITY", 64),
    })
}

/// `HISTORY_DAYS` must fit one collection window.
fn check_history_days(days: u32) -> Result<u32> {
    if days == 0 || days > MAX_HISTORY_DAYS {
        return Err(anyhow!(
            "Invalid HISTORY_DAYS: {} is outside 1..={}",
            days,
            MAX_HISTORY_DAYS
        ));
    }
    Ok(days)
}

fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
        }
    }
    db_url.to_string()
}

fn key_state(key: &Option<String>) -> &'static str {
    if key.is_some() {
        "set"
    } else {
        "unset"
    }
}

impl Config {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.provider_timeout_secs))
    }

    /// Engine settings derived from this configuration.
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            provider_timeout: self.provider_timeout(),
            cache_ttl: chrono::Duration::hours(i64::from(self.cache_ttl_hours)),
            history_days: self.history_days,
            training: TrainingConfig {
                epochs: self.training_epochs as usize,
                ..TrainingConfig::default()
            },
            registry_capacity: self.model_registry_capacity as usize,
        }
    }

    /// Log the loaded configuration with the database password masked and
    /// API keys reduced to set/unset.
    pub fn log_config(&self) {
        // ---
        let masked_db_url = self
            .db_url
            .as_deref()
            .map(mask_db_url)
            .unwrap_or_else(|| "(unset, using in-memory cache)".to_string());

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL            : {}", masked_db_url);
        tracing::info!("  DB_POOL_MAX             : {}", self.db_pool_max);
        tracing::info!("  LISTEN_PORT             : {}", self.listen_port);
        tracing::info!("  IQAIR_API_KEY           : {}", key_state(&self.iqair_api_key));
        tracing::info!("  OPENAQ_API_KEY          : {}", key_state(&self.openaq_api_key));
        tracing::info!("  WAQI_API_KEY            : {}", key_state(&self.waqi_api_key));
        tracing::info!("  PROVIDER_TIMEOUT_SECS   : {}", self.provider_timeout_secs);
        tracing::info!("  HISTORY_DAYS            : {}", self.history_days);
        tracing::info!("  CACHE_TTL_HOURS         : {}", self.cache_ttl_hours);
        tracing::info!("  TRAINING_EPOCHS         : {}", self.training_epochs);
        tracing::info!("  MODEL_REGISTRY_CAPACITY : {}", self.model_registry_capacity);
    }
}
