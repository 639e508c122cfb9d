//! Health endpoints
//!
//! `/api/health` probes dependent services; `/health` is a liveness check
//! that touches nothing outside the process.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::services::ServiceHealth;
use crate::AppState;

const HEALTHY_MESSAGE: &str = "All services operational";
const UNHEALTHY_MESSAGE: &str = "One or more services are experiencing issues";

/// Per-service detail of GET /api/health
#[derive(Debug, Serialize)]
pub struct ServicesHealth {
    /// Task queue; keyed `celery` on the wire for existing dashboards
    #[serde(rename = "celery")]
    pub queue: ServiceHealth,
    pub plex: ServiceHealth,
}

/// GET /api/health response
#[derive(Debug, Serialize)]
pub struct ServiceHealthResponse {
    /// "healthy" or "error"
    pub status: &'static str,
    pub message: &'static str,
    pub timestamp: DateTime<Utc>,
    pub services: ServicesHealth,
}

/// GET /health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    /// Module name ("plexkw-labeler")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
}

/// GET /api/health
///
/// 200 when every service is connected, 500 otherwise; same body shape.
pub async fn service_health(
    State(state): State<AppState>,
) -> (StatusCode, Json<ServiceHealthResponse>) {
    let report = state.health.check().await;
    let healthy = report.is_healthy();

    let (code, status, message) = if healthy {
        (StatusCode::OK, "healthy", HEALTHY_MESSAGE)
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "error", UNHEALTHY_MESSAGE)
    };

    (
        code,
        Json(ServiceHealthResponse {
            status,
            message,
            timestamp: report.checked_at,
            services: ServicesHealth {
                queue: report.queue,
                plex: report.plex,
            },
        }),
    )
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "plexkw-labeler".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(service_health))
}
