//! IMDb keyword client
//!
//! Scrapes the keywords page of a title and reads the keyword list out of the
//! embedded `__NEXT_DATA__` JSON island. IMDb has no stable API contract, so
//! every failure mode ends as an empty list plus a logged event; callers never
//! see an error.

use async_trait::async_trait;
use plexkw_common::validate::is_valid_imdb_id;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::keyword_cache::KeywordCache;
use super::rate_window::RateWindow;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
/// Per-request timeout for keyword pages
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const NEXT_DATA_SELECTOR: &str = r#"script[id="__NEXT_DATA__"]"#;
const KEYWORD_EDGES_POINTER: &str = "/props/pageProps/contentData/data/title/keywords/edges";
const KEYWORD_TEXT_POINTER: &str = "/node/keyword/text/text";

/// Why a keywords page could not be turned into a keyword list
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeywordExtractError {
    #[error("__NEXT_DATA__ script element not found")]
    MissingDataIsland,

    #[error("__NEXT_DATA__ is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("keyword edges missing from __NEXT_DATA__")]
    MissingKeywordPath,
}

/// IMDb client errors (never surfaced past [`ImdbClient::fetch_keywords`])
#[derive(Debug, Error)]
pub enum ImdbError {
    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("IMDb returned HTTP {0}")]
    Status(u16),

    #[error(transparent)]
    Extract(#[from] KeywordExtractError),
}

impl From<reqwest::Error> for ImdbError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ImdbError::Timeout
        } else {
            ImdbError::NetworkError(err.to_string())
        }
    }
}

/// Pull keyword strings out of a keywords page, in page order
///
/// Edges without keyword text are skipped.
pub fn extract_keywords(html: &str) -> Result<Vec<String>, KeywordExtractError> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(NEXT_DATA_SELECTOR).expect("__NEXT_DATA__ selector");

    let script = document
        .select(&selector)
        .next()
        .ok_or(KeywordExtractError::MissingDataIsland)?;
    let raw: String = script.text().collect();

    let data: Value = serde_json::from_str(raw.trim())
        .map_err(|e| KeywordExtractError::MalformedJson(e.to_string()))?;

    let edges = data
        .pointer(KEYWORD_EDGES_POINTER)
        .and_then(Value::as_array)
        .ok_or(KeywordExtractError::MissingKeywordPath)?;

    Ok(edges
        .iter()
        .filter_map(|edge| edge.pointer(KEYWORD_TEXT_POINTER).and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

/// Anything that can produce keywords for an IMDb id
#[async_trait]
pub trait KeywordSource: Send + Sync {
    /// Keywords for `imdb_id`; empty on any failure
    async fn fetch_keywords(&self, imdb_id: &str) -> Vec<String>;
}

/// IMDb keywords page client
pub struct ImdbClient {
    http_client: reqwest::Client,
    base_url: String,
    rate_window: Arc<dyn RateWindow>,
    cache: Arc<dyn KeywordCache>,
    timeout: Duration,
}

impl ImdbClient {
    pub fn new(
        base_url: &str,
        rate_window: Arc<dyn RateWindow>,
        cache: Arc<dyn KeywordCache>,
    ) -> Result<Self, ImdbError> {
        Self::with_timeout(base_url, rate_window, cache, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        rate_window: Arc<dyn RateWindow>,
        cache: Arc<dyn KeywordCache>,
        timeout: Duration,
    ) -> Result<Self, ImdbError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ImdbError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_window,
            cache,
            timeout,
        })
    }

    pub fn keywords_url(&self, imdb_id: &str) -> String {
        format!("{}/title/{}/keywords/", self.base_url, imdb_id)
    }

    /// One throttled network fetch plus extraction, no cache
    async fn fetch_uncached(&self, imdb_id: &str) -> Result<Vec<String>, ImdbError> {
        if let Some(pause) = self.rate_window.throttle_delay() {
            tracing::warn!(
                event = "imdb_rate_limited",
                imdb_id = %imdb_id,
                pause_ms = pause.as_millis() as u64,
                "IMDb request window full, pausing"
            );
            tokio::time::sleep(pause).await;
        }

        let url = self.keywords_url(imdb_id);
        tracing::debug!(imdb_id = %imdb_id, url = %url, "Fetching IMDb keywords page");

        let response = self.http_client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImdbError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        self.rate_window.record_call();

        Ok(extract_keywords(&body)?)
    }
}

#[async_trait]
impl KeywordSource for ImdbClient {
    async fn fetch_keywords(&self, imdb_id: &str) -> Vec<String> {
        if !is_valid_imdb_id(imdb_id) {
            tracing::error!(
                event = "imdb_invalid_id",
                imdb_id = %imdb_id,
                "Refusing to fetch keywords for invalid IMDb ID"
            );
            return Vec::new();
        }

        if let Some(keywords) = self.cache.get(imdb_id) {
            tracing::debug!(
                event = "imdb_cache_hit",
                imdb_id = %imdb_id,
                keywords_count = keywords.len(),
                "Serving IMDb keywords from cache"
            );
            return keywords;
        }

        match self.fetch_uncached(imdb_id).await {
            Ok(keywords) => {
                tracing::info!(
                    event = "imdb_keywords_fetched",
                    imdb_id = %imdb_id,
                    keywords_count = keywords.len(),
                    "Retrieved keywords from IMDb"
                );
                if !keywords.is_empty() {
                    self.cache.put(imdb_id, keywords.clone());
                }
                keywords
            }
            Err(ImdbError::Timeout) => {
                tracing::error!(
                    event = "imdb_timeout",
                    imdb_id = %imdb_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Timed out fetching IMDb keywords"
                );
                Vec::new()
            }
            Err(e) => {
                tracing::error!(
                    event = "imdb_fetch_failed",
                    imdb_id = %imdb_id,
                    error = %e,
                    "Failed to fetch IMDb keywords"
                );
                Vec::new()
            }
        }
    }
}
