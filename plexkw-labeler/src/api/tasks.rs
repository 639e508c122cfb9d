//! Task status lookup

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{EnrichmentJob, JobState};
use crate::AppState;

/// GET /api/tasks/:task_id response
#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub state: JobState,
    pub imdb_id: String,
    pub rating_key: String,
    pub attempt: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    /// Next attempt time; only meaningful while RETRYING
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskStatusResponse {
    fn from_job(job: EnrichmentJob, max_attempts: u32) -> Self {
        let next_attempt_at = (job.state == JobState::Retrying).then_some(job.run_at);
        Self {
            task_id: job.job_id,
            state: job.state,
            imdb_id: job.imdb_id.to_string(),
            rating_key: job.rating_key.to_string(),
            attempt: job.attempt,
            max_attempts,
            last_error: job.last_error,
            next_attempt_at,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// GET /api/tasks/:task_id
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskStatusResponse>> {
    let not_found = || ApiError::NotFound(format!("Task not found: {}", task_id));

    let job_id = Uuid::parse_str(&task_id).map_err(|_| not_found())?;
    let job = state.queue.get(job_id).await?.ok_or_else(not_found)?;

    Ok(Json(TaskStatusResponse::from_job(
        job,
        state.retry_policy.max_attempts,
    )))
}

/// Build task routes
pub fn task_routes() -> Router<AppState> {
    Router::new().route("/api/tasks/:task_id", get(get_task))
}
