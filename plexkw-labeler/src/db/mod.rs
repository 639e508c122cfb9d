//! Task queue database
//!
//! The enrichment queue is durable: every job is a row in `enrichment_jobs`
//! carrying its attempt count, so a restart resumes pending work.

pub mod jobs;

use plexkw_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

/// Open the broker database and create tables
///
/// In-memory URLs get a single long-lived connection; every SQLite
/// connection to `:memory:` is its own database.
pub async fn init_database_pool(broker_url: &str) -> Result<SqlitePool> {
    tracing::debug!("Connecting to task queue database: {}", broker_url);

    let options = SqliteConnectOptions::from_str(broker_url)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));

    let pool_options = if broker_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(8)
    };

    let pool = pool_options.connect_with(options).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the jobs table if it doesn't exist
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS enrichment_jobs (
            job_id TEXT PRIMARY KEY,
            imdb_id TEXT NOT NULL,
            rating_key TEXT NOT NULL,
            state TEXT NOT NULL,
            attempt INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            run_at_ms INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_enrichment_jobs_due ON enrichment_jobs (state, run_at_ms)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (enrichment_jobs)");

    Ok(())
}
