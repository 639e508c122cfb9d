//! Plex Media Server client
//!
//! Writes IMDb keywords onto library items as labels and probes the server
//! for health checks. Label writes never return an error: failures are logged
//! and reported as `false`.

use async_trait::async_trait;
use plexkw_common::validate::is_valid_rating_key;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Header carrying the Plex access token
pub const PLEX_TOKEN_HEADER: &str = "X-Plex-Token";

/// Message reported by a successful probe
pub const PLEX_CONNECTED_MESSAGE: &str = "Connected to Plex server successfully";

/// Timeout for label writes and connectivity probes
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Plex client construction errors
#[derive(Debug, Error)]
pub enum PlexError {
    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Why a Plex connectivity probe failed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlexProbeError {
    #[error("Invalid Plex token")]
    Unauthorized,

    #[error("Plex server not found")]
    NotFound,

    #[error("Timeout connecting to Plex server")]
    Timeout,

    #[error("Failed to connect to Plex server: {0}")]
    RequestFailed(String),
}

/// Coerce labels to trimmed strings and drop empties
pub fn normalize_labels<T: ToString>(labels: &[T]) -> Vec<String> {
    labels
        .iter()
        .map(|label| label.to_string().trim().to_string())
        .filter(|label| !label.is_empty())
        .collect()
}

/// Plex form parameters for a label set: `label[i].tag.tag=value`
pub fn label_params(labels: &[String]) -> Vec<(String, String)> {
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| (format!("label[{}].tag.tag", i), label.clone()))
        .collect()
}

/// Anything that can attach labels to a media-server item
#[async_trait]
pub trait LabelSink: Send + Sync {
    /// True when the labels were written
    async fn write_labels(&self, rating_key: &str, labels: &[String]) -> bool;
}

/// Plex Media Server API client
pub struct PlexClient {
    http_client: reqwest::Client,
    base_url: String,
    token: String,
    timeout: Duration,
}

impl PlexClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, PlexError> {
        Self::with_timeout(base_url, token, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, token: &str, timeout: Duration) -> Result<Self, PlexError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlexError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Replace the labels of one library item
    ///
    /// **Algorithm:**
    /// 1. Reject an invalid rating key or an empty label list
    /// 2. Normalise labels (trimmed strings, no empties)
    /// 3. PUT `/library/metadata/{rating_key}` with indexed label parameters
    pub async fn update_labels<T: ToString + Sync>(&self, rating_key: &str, labels: &[T]) -> bool {
        if !is_valid_rating_key(rating_key) {
            tracing::error!(
                event = "plex_labels_rejected",
                rating_key = %rating_key,
                "Invalid rating key format"
            );
            return false;
        }

        if labels.is_empty() {
            tracing::error!(
                event = "plex_labels_rejected",
                rating_key = %rating_key,
                "Invalid labels format: no labels given"
            );
            return false;
        }

        let labels = normalize_labels(labels);
        if labels.is_empty() {
            tracing::warn!(
                event = "plex_labels_rejected",
                rating_key = %rating_key,
                "No valid labels to update"
            );
            return false;
        }

        let url = format!("{}/library/metadata/{}", self.base_url, rating_key);
        let result = self
            .http_client
            .put(&url)
            .header(PLEX_TOKEN_HEADER, &self.token)
            .header(ACCEPT, "application/json")
            .query(&label_params(&labels))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::info!(
                    event = "plex_labels_updated",
                    rating_key = %rating_key,
                    labels_count = labels.len(),
                    status_code = response.status().as_u16(),
                    "Updated Plex labels"
                );
                true
            }
            Ok(response) => {
                tracing::error!(
                    event = "plex_labels_failed",
                    rating_key = %rating_key,
                    status_code = response.status().as_u16(),
                    "Failed to update Plex labels"
                );
                false
            }
            Err(e) if e.is_timeout() => {
                tracing::error!(
                    event = "plex_labels_failed",
                    rating_key = %rating_key,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Timeout updating Plex labels"
                );
                false
            }
            Err(e) => {
                tracing::error!(
                    event = "plex_labels_failed",
                    rating_key = %rating_key,
                    status_code = e.status().map(|s| s.as_u16()),
                    error = %e,
                    "Failed to update Plex labels"
                );
                false
            }
        }
    }

    /// Check that the server is reachable and accepts the token
    pub async fn validate_connection(&self) -> Result<(), PlexProbeError> {
        let url = format!("{}/library/sections", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .header(PLEX_TOKEN_HEADER, &self.token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PlexProbeError::Timeout
                } else {
                    PlexProbeError::RequestFailed(e.to_string())
                }
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED => Err(PlexProbeError::Unauthorized),
            StatusCode::NOT_FOUND => Err(PlexProbeError::NotFound),
            status => Err(PlexProbeError::RequestFailed(format!("HTTP {}", status))),
        }
    }
}

#[async_trait]
impl LabelSink for PlexClient {
    async fn write_labels(&self, rating_key: &str, labels: &[String]) -> bool {
        self.update_labels(rating_key, labels).await
    }
}
