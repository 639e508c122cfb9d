//! Dependent-service health aggregation
//!
//! Probes the task queue database and the Plex server on demand. Nothing is
//! cached or persisted between checks.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::plex_client::{PlexClient, PLEX_CONNECTED_MESSAGE};
use crate::workflow::JobQueue;

/// Broker probe timeout
pub const QUEUE_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection status of one dependent service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Connected,
    Error,
}

/// Health of one dependent service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    /// Probed component ("task_queue" or "plex")
    pub component: &'static str,
    pub status: ServiceStatus,
    pub message: String,
}

impl ServiceHealth {
    fn connected(component: &'static str, message: impl Into<String>) -> Self {
        Self {
            component,
            status: ServiceStatus::Connected,
            message: message.into(),
        }
    }

    fn error(component: &'static str, message: impl Into<String>) -> Self {
        Self {
            component,
            status: ServiceStatus::Error,
            message: message.into(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ServiceStatus::Connected
    }
}

/// Result of one health check
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub queue: ServiceHealth,
    pub plex: ServiceHealth,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// Healthy only when every service is connected
    pub fn is_healthy(&self) -> bool {
        self.queue.is_connected() && self.plex.is_connected()
    }
}

/// Health aggregator over the queue database and Plex
pub struct HealthChecker {
    queue: JobQueue,
    plex: Arc<PlexClient>,
    queue_timeout: Duration,
}

impl HealthChecker {
    pub fn new(queue: JobQueue, plex: Arc<PlexClient>) -> Self {
        Self {
            queue,
            plex,
            queue_timeout: QUEUE_PROBE_TIMEOUT,
        }
    }

    /// Probe all services concurrently
    pub async fn check(&self) -> HealthReport {
        let (queue, plex) = tokio::join!(self.check_queue(), self.check_plex());

        let report = HealthReport {
            queue,
            plex,
            checked_at: Utc::now(),
        };

        if !report.is_healthy() {
            tracing::warn!(
                event = "health_check_failed",
                queue_status = ?report.queue.status,
                queue_message = %report.queue.message,
                plex_status = ?report.plex.status,
                plex_message = %report.plex.message,
                "One or more services are unhealthy"
            );
        }

        report
    }

    async fn check_queue(&self) -> ServiceHealth {
        const COMPONENT: &str = "task_queue";

        match tokio::time::timeout(self.queue_timeout, self.queue.ping()).await {
            Ok(Ok(())) => ServiceHealth::connected(COMPONENT, "Task queue database reachable"),
            Ok(Err(e)) => ServiceHealth::error(COMPONENT, format!("Task queue unavailable: {}", e)),
            Err(_) => ServiceHealth::error(
                COMPONENT,
                format!(
                    "Task queue did not respond within {}ms",
                    self.queue_timeout.as_millis()
                ),
            ),
        }
    }

    async fn check_plex(&self) -> ServiceHealth {
        const COMPONENT: &str = "plex";

        match self.plex.validate_connection().await {
            Ok(()) => ServiceHealth::connected(COMPONENT, PLEX_CONNECTED_MESSAGE),
            Err(e) => ServiceHealth::error(COMPONENT, e.to_string()),
        }
    }
}
