//! Enrichment job database operations

use chrono::{DateTime, TimeZone, Utc};
use plexkw_common::{Error, ImdbId, RatingKey, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{EnrichmentJob, JobState};

const JOB_COLUMNS: &str = "job_id, imdb_id, rating_key, state, attempt, last_error, \
                           run_at_ms, created_at, updated_at";

/// Insert a new job
pub async fn insert_job(pool: &SqlitePool, job: &EnrichmentJob) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO enrichment_jobs (
            job_id, imdb_id, rating_key, state, attempt, last_error,
            run_at_ms, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(job.job_id.to_string())
    .bind(job.imdb_id.as_str())
    .bind(job.rating_key.as_str())
    .bind(job.state.as_str())
    .bind(job.attempt as i64)
    .bind(&job.last_error)
    .bind(job.run_at.timestamp_millis())
    .bind(job.created_at.to_rfc3339())
    .bind(job.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a job by id
pub async fn load_job(pool: &SqlitePool, job_id: Uuid) -> Result<Option<EnrichmentJob>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM enrichment_jobs WHERE job_id = ?",
        JOB_COLUMNS
    ))
    .bind(job_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|row| job_from_row(&row)).transpose()
}

/// Atomically claim the earliest due job
///
/// Moves it to RUNNING and increments its attempt count in one statement, so
/// two workers never claim the same job.
pub async fn claim_next_due(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Option<EnrichmentJob>> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE enrichment_jobs
        SET state = 'RUNNING', attempt = attempt + 1, updated_at = ?
        WHERE job_id = (
            SELECT job_id FROM enrichment_jobs
            WHERE state IN ('QUEUED', 'RETRYING') AND run_at_ms <= ?
            ORDER BY run_at_ms, created_at
            LIMIT 1
        )
        RETURNING {}
        "#,
        JOB_COLUMNS
    ))
    .bind(now.to_rfc3339())
    .bind(now.timestamp_millis())
    .fetch_optional(pool)
    .await?;

    row.map(|row| job_from_row(&row)).transpose()
}

/// Record the outcome of an attempt
pub async fn record_transition(
    pool: &SqlitePool,
    job_id: Uuid,
    state: JobState,
    last_error: Option<&str>,
    run_at: DateTime<Utc>,
) -> Result<()> {
    if !JobState::Running.can_transition_to(state) {
        return Err(Error::Internal(format!(
            "Job {} cannot move from RUNNING to {}",
            job_id, state
        )));
    }

    let result = sqlx::query(
        r#"
        UPDATE enrichment_jobs
        SET state = ?, last_error = ?, run_at_ms = ?, updated_at = ?
        WHERE job_id = ? AND state = 'RUNNING'
        "#,
    )
    .bind(state.as_str())
    .bind(last_error)
    .bind(run_at.timestamp_millis())
    .bind(Utc::now().to_rfc3339())
    .bind(job_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::Internal(format!(
            "Job {} is not RUNNING, cannot move to {}",
            job_id, state
        )));
    }

    Ok(())
}

/// Recover jobs left RUNNING by a previous process
///
/// Jobs with attempts left become RETRYING and due now; the rest are FAILED.
/// Returns (requeued, failed).
pub async fn recover_interrupted(
    pool: &SqlitePool,
    max_attempts: u32,
    now: DateTime<Utc>,
) -> Result<(u64, u64)> {
    let requeued = sqlx::query(
        r#"
        UPDATE enrichment_jobs
        SET state = 'RETRYING', run_at_ms = ?, updated_at = ?,
            last_error = 'Interrupted by shutdown'
        WHERE state = 'RUNNING' AND attempt < ?
        "#,
    )
    .bind(now.timestamp_millis())
    .bind(now.to_rfc3339())
    .bind(max_attempts as i64)
    .execute(pool)
    .await?
    .rows_affected();

    let failed = sqlx::query(
        r#"
        UPDATE enrichment_jobs
        SET state = 'FAILED', updated_at = ?,
            last_error = 'Interrupted by shutdown on final attempt'
        WHERE state = 'RUNNING'
        "#,
    )
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?
    .rows_affected();

    Ok((requeued, failed))
}

/// Milliseconds until the earliest pending job is due, if any
pub async fn next_due_in_ms(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Option<i64>> {
    let next: Option<i64> = sqlx::query_scalar(
        "SELECT MIN(run_at_ms) FROM enrichment_jobs WHERE state IN ('QUEUED', 'RETRYING')",
    )
    .fetch_one(pool)
    .await?;

    Ok(next.map(|at| (at - now.timestamp_millis()).max(0)))
}

/// Cheap connectivity check against the queue database
pub async fn ping(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

fn job_from_row(row: &SqliteRow) -> Result<EnrichmentJob> {
    let job_id: String = row.try_get("job_id")?;
    let job_id = Uuid::parse_str(&job_id)
        .map_err(|e| Error::Internal(format!("Failed to parse job_id: {}", e)))?;

    let imdb_id: String = row.try_get("imdb_id")?;
    let rating_key: String = row.try_get("rating_key")?;
    let state: String = row.try_get("state")?;
    let attempt: i64 = row.try_get("attempt")?;
    let run_at_ms: i64 = row.try_get("run_at_ms")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(EnrichmentJob {
        job_id,
        imdb_id: ImdbId::parse(&imdb_id)?,
        rating_key: RatingKey::parse(&rating_key)?,
        state: state.parse()?,
        attempt: u32::try_from(attempt)
            .map_err(|e| Error::Internal(format!("Invalid attempt count {}: {}", attempt, e)))?,
        last_error: row.try_get("last_error")?,
        run_at: Utc
            .timestamp_millis_opt(run_at_ms)
            .single()
            .ok_or_else(|| Error::Internal(format!("Invalid run_at_ms: {}", run_at_ms)))?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", value, e)))
}
