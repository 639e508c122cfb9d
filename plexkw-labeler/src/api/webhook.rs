//! Plex webhook intake
//!
//! POST /api/plex-webhook validates a `library.new` event, enqueues one
//! enrichment job and answers 202 without waiting for it.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use plexkw_common::sanitize::{sanitise_string, sanitise_value};
use plexkw_common::validate::IMDB_GUID_SCHEME;
use plexkw_common::{ImdbId, RatingKey};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::extract::WebhookForm;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// The only Plex event that triggers enrichment
pub const LIBRARY_NEW_EVENT: &str = "library.new";

/// Movie fields extracted from a webhook event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookMovie {
    pub imdb_id: ImdbId,
    pub rating_key: RatingKey,
    /// Sanitised title
    pub title: String,
    pub year: Option<i64>,
}

/// POST /api/plex-webhook response
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub message: String,
    pub task_id: Uuid,
    pub movie: WebhookMovie,
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError::BadRequest(message.into())
}

/// Validate a raw webhook `payload` field and extract the movie it names
pub fn parse_webhook_event(payload: Option<&str>) -> ApiResult<WebhookMovie> {
    let payload = payload.ok_or_else(|| bad_request("Missing payload in request"))?;

    let data: Value =
        serde_json::from_str(payload).map_err(|_| bad_request("Invalid JSON payload"))?;

    let data = match data {
        Value::Object(map) if !map.is_empty() => map,
        _ => return Err(bad_request("Empty or invalid payload")),
    };

    tracing::info!(
        event = "plex_webhook_received",
        plex_event = %sanitise_value(data.get("event")),
        "Plex webhook received"
    );

    match data.get("event").and_then(Value::as_str) {
        Some(LIBRARY_NEW_EVENT) => {}
        other => {
            let event = sanitise_string(other.unwrap_or_default());
            return Err(bad_request(format!(
                "Invalid or unsupported event type: {}",
                event
            )));
        }
    }

    let metadata = data.get("Metadata");

    // First IMDb guid wins, even when a later one would validate
    let imdb_guid = metadata
        .and_then(|m| m.get("Guid"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|guid| guid.get("id").and_then(Value::as_str))
        .find(|id| id.starts_with(IMDB_GUID_SCHEME));

    let imdb_id = imdb_guid
        .and_then(ImdbId::from_guid)
        .ok_or_else(|| bad_request("No valid IMDb ID found"))?;

    let rating_key = match metadata.and_then(|m| m.get("ratingKey")) {
        None | Some(Value::Null) => return Err(bad_request("Missing rating key")),
        Some(Value::String(key)) => key.clone(),
        Some(Value::Number(key)) => key.to_string(),
        Some(_) => return Err(bad_request("Invalid rating key format")),
    };
    let rating_key =
        RatingKey::parse(&rating_key).map_err(|_| bad_request("Invalid rating key format"))?;

    let title = sanitise_value(metadata.and_then(|m| m.get("title")));
    let year = match metadata.and_then(|m| m.get("year")) {
        Some(Value::Number(year)) => year.as_i64(),
        Some(Value::String(year)) => year.trim().parse().ok(),
        _ => None,
    };

    Ok(WebhookMovie {
        imdb_id,
        rating_key,
        title,
        year,
    })
}

/// POST /api/plex-webhook
pub async fn plex_webhook(
    State(state): State<AppState>,
    form: WebhookForm,
) -> ApiResult<(StatusCode, Json<WebhookResponse>)> {
    let movie = match parse_webhook_event(form.payload.as_deref()) {
        Ok(movie) => movie,
        Err(e) => {
            tracing::warn!(event = "plex_webhook_rejected", error = %e, "Plex webhook rejected");
            return Err(e);
        }
    };

    let task_id = state
        .queue
        .enqueue(movie.imdb_id.clone(), movie.rating_key.clone())
        .await?;

    let year = movie
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    tracing::info!(
        event = "movie_added",
        task_id = %task_id,
        imdb_id = %movie.imdb_id,
        rating_key = %movie.rating_key,
        title = %movie.title,
        year = %year,
        "Movie queued for label enrichment"
    );

    let message = format!(
        "Processing IMDb ID: {}, {} ({})",
        movie.imdb_id, movie.title, year
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(WebhookResponse {
            status: "processing",
            message,
            task_id,
            movie,
        }),
    ))
}

/// Build webhook routes
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/api/plex-webhook", post(plex_webhook))
}
