//! Database schema management for `airfusion`.
//!
//! Ensures the cache table exists before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `dataset_cache` table backing [`crate::PgCacheStore`]. Safe to
/// call on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // Cached historical datasets keyed by rounded coordinates
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dataset_cache (
            cache_key  TEXT        PRIMARY KEY,
            payload    TEXT        NOT NULL,
            stored_at  TIMESTAMPTZ NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Staleness sweeps scan by write time
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_dataset_cache_stored_at
            ON dataset_cache (stored_at);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
