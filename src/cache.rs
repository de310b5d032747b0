//! Cache abstraction for datasets and other JSON-serialisable values.
//!
//! The store only knows about opaque JSON payloads and when they were written.
//! Freshness is decided by the reader (see [`get_fresh`]) so different callers
//! can apply different TTLs to the same store.
//!
//! Two backends:
//! - [`MemoryCache`] – process-local map, used when no database is configured
//! - [`PgCacheStore`] – Postgres table created by `schema::create_schema`

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::error::{AirQualityError, Result};

/// One cached value plus the wall-clock time it was written.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: serde_json::Value,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.stored_at
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Last writer wins.
    async fn put(&self, key: &str, entry: CacheEntry) -> Result<()>;
}

// ---

/// Read `key` and decode it, returning `None` when missing, stale or
/// undecodable.
pub async fn get_fresh<T: DeserializeOwned>(
    store: &dyn CacheStore,
    key: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<Option<T>> {
    // ---
    let Some(entry) = store.get(key).await? else {
        tracing::debug!("cache miss for {}", key);
        return Ok(None);
    };

    let age = entry.age(now);
    if age >= ttl {
        tracing::debug!(
            "cache entry {} expired ({:.1}h old)",
            key,
            age.num_minutes() as f64 / 60.0
        );
        return Ok(None);
    }

    match serde_json::from_value::<T>(entry.payload) {
        Ok(value) => {
            tracing::debug!(
                "cache hit for {} ({:.1}h old)",
                key,
                age.num_minutes() as f64 / 60.0
            );
            Ok(Some(value))
        }
        Err(e) => {
            tracing::warn!("discarding undecodable cache entry {}: {}", key, e);
            Ok(None)
        }
    }
}

/// Encode `value` and write it under `key`, stamped with `now`.
pub async fn put_value<T: Serialize>(
    store: &dyn CacheStore,
    key: &str,
    value: &T,
    now: DateTime<Utc>,
) -> Result<()> {
    let payload = serde_json::to_value(value).map_err(|e| AirQualityError::Cache(e.to_string()))?;
    store
        .put(
            key,
            CacheEntry {
                payload,
                stored_at: now,
            },
        )
        .await
}

/// Process-local cache.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }
}

/// Postgres-backed cache over the `dataset_cache` table.
#[derive(Clone)]
pub struct PgCacheStore {
    pool: PgPool,
}

impl PgCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        // ---
        let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT payload, stored_at
            FROM dataset_cache
            WHERE cache_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AirQualityError::Cache(e.to_string()))?;

        let Some((payload, stored_at)) = row else {
            return Ok(None);
        };

        let payload =
            serde_json::from_str(&payload).map_err(|e| AirQualityError::Cache(e.to_string()))?;
        Ok(Some(CacheEntry { payload, stored_at }))
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<()> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO dataset_cache (cache_key, payload, stored_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (cache_key) DO UPDATE SET
                payload = EXCLUDED.payload,
                stored_at = EXCLUDED.stored_at
            "#,
        )
        .bind(key)
        .bind(entry.payload.to_string())
        .bind(entry.stored_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AirQualityError::Cache(e.to_string()))?;

        Ok(())
    }
}
