//! plexkw-labeler library interface
//!
//! Receives Plex webhooks, queues enrichment jobs, and writes IMDb plot
//! keywords back to Plex as labels. Exposed as a library for integration
//! testing; the binary in `main.rs` wires it to configuration.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use axum::{http::StatusCode, response::Response, Router};
use chrono::{DateTime, Utc};
use std::any::Any;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::error::{error_response, INTERNAL_ERROR_MESSAGE};
use crate::services::HealthChecker;
use crate::workflow::{JobQueue, RetryPolicy};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Durable enrichment job queue
    pub queue: JobQueue,
    /// Dependent-service probes for /api/health
    pub health: Arc<HealthChecker>,
    /// Retry ceiling reported by task lookups
    pub retry_policy: RetryPolicy,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(queue: JobQueue, health: Arc<HealthChecker>, retry_policy: RetryPolicy) -> Self {
        Self {
            queue,
            health,
            retry_policy,
            startup_time: Utc::now(),
        }
    }
}

/// Render a handler panic as the generic 500 body
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    tracing::error!(error = %detail, "Request handler panicked");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::webhook_routes())
        .merge(api::label_routes())
        .merge(api::task_routes())
        .merge(api::health_routes())
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
