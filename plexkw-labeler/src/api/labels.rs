//! Manual label refresh
//!
//! POST /api/update-labels/:rating_key enqueues the same job the webhook
//! does, for an item the caller names directly.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use plexkw_common::sanitize::sanitise_string;
use plexkw_common::validate::{is_valid_imdb_id, is_valid_rating_key};
use plexkw_common::{ImdbId, RatingKey};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::extract::JsonObject;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Echo of the validated request
#[derive(Debug, Serialize)]
pub struct LabelRequestDetails {
    pub imdb_id: ImdbId,
    pub rating_key: RatingKey,
}

/// POST /api/update-labels response
#[derive(Debug, Serialize)]
pub struct UpdateLabelsResponse {
    pub status: &'static str,
    pub message: String,
    pub task_id: Uuid,
    pub details: LabelRequestDetails,
}

/// POST /api/update-labels/:rating_key
///
/// Body: `{"imdb_id": "tt0111161"}`. Returns 202 with the task id.
pub async fn update_labels(
    State(state): State<AppState>,
    Path(rating_key): Path<String>,
    JsonObject(body): JsonObject,
) -> ApiResult<(StatusCode, Json<UpdateLabelsResponse>)> {
    if !is_valid_rating_key(&rating_key) {
        tracing::warn!(
            rating_key = %sanitise_string(&rating_key),
            "Rejected label request with invalid rating key"
        );
        return Err(ApiError::BadRequest("Invalid rating key format".to_string()));
    }

    let imdb_id = match body.get("imdb_id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.trim(),
        _ => return Err(ApiError::BadRequest("Valid IMDb ID is required".to_string())),
    };
    if !is_valid_imdb_id(imdb_id) {
        return Err(ApiError::BadRequest("Invalid IMDb ID format".to_string()));
    }

    let imdb_id = ImdbId::parse(imdb_id)?;
    let rating_key = RatingKey::parse(&rating_key)?;

    let task_id = state
        .queue
        .enqueue(imdb_id.clone(), rating_key.clone())
        .await?;

    tracing::info!(
        event = "labels_requested",
        task_id = %task_id,
        imdb_id = %imdb_id,
        rating_key = %rating_key,
        "Manual label update queued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(UpdateLabelsResponse {
            status: "processing",
            message: format!("Processing IMDb ID {} in the background", imdb_id),
            task_id,
            details: LabelRequestDetails {
                imdb_id,
                rating_key,
            },
        }),
    ))
}

/// Build manual label routes
pub fn label_routes() -> Router<AppState> {
    Router::new().route("/api/update-labels/:rating_key", post(update_labels))
}
