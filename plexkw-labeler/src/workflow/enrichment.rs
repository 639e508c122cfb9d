//! One attempt of fetch-then-write enrichment
//!
//! The IMDb client and the Plex writer never fail outright; this is the layer
//! that turns "no effect" (no keywords, write refused) into a retryable error.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::models::EnrichmentJob;
use crate::services::{KeywordSource, LabelSink};

/// Most labels written to one item
pub const MAX_LABELS: usize = 50;

/// Retryable attempt failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("No keywords found for IMDb ID: {0}")]
    NoKeywords(String),

    #[error("Failed to update Plex labels for rating key: {0}")]
    LabelWriteFailed(String),
}

/// Result of a successful attempt
#[derive(Debug, Clone, Serialize)]
pub struct TaskSuccess {
    pub message: String,
    pub labels: Vec<String>,
}

/// Fetch keywords and write them as labels
pub struct EnrichmentTask {
    source: Arc<dyn KeywordSource>,
    sink: Arc<dyn LabelSink>,
}

impl EnrichmentTask {
    pub fn new(source: Arc<dyn KeywordSource>, sink: Arc<dyn LabelSink>) -> Self {
        Self { source, sink }
    }

    /// Run one attempt for a claimed job
    pub async fn run_attempt(&self, job: &EnrichmentJob) -> Result<TaskSuccess, TaskError> {
        tracing::info!(
            event = "task_started",
            task_id = %job.job_id,
            imdb_id = %job.imdb_id,
            rating_key = %job.rating_key,
            attempt = job.attempt,
            "Enrichment attempt started"
        );

        let mut labels = self.source.fetch_keywords(job.imdb_id.as_str()).await;
        labels.retain(|label| !label.trim().is_empty());
        if labels.is_empty() {
            return Err(TaskError::NoKeywords(job.imdb_id.to_string()));
        }

        labels.truncate(MAX_LABELS);

        if !self.sink.write_labels(job.rating_key.as_str(), &labels).await {
            return Err(TaskError::LabelWriteFailed(job.rating_key.to_string()));
        }

        tracing::info!(
            event = "task_completed",
            task_id = %job.job_id,
            imdb_id = %job.imdb_id,
            rating_key = %job.rating_key,
            labels_count = labels.len(),
            "Enrichment completed"
        );

        Ok(TaskSuccess {
            message: format!("Updated {} labels for {}", labels.len(), job.imdb_id),
            labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use plexkw_common::{ImdbId, RatingKey};
    use std::sync::Mutex;

    struct FixedSource(Vec<String>);

    #[async_trait]
    impl KeywordSource for FixedSource {
        async fn fetch_keywords(&self, _imdb_id: &str) -> Vec<String> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        accept: bool,
        written: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl LabelSink for RecordingSink {
        async fn write_labels(&self, _rating_key: &str, labels: &[String]) -> bool {
            self.written.lock().unwrap().push(labels.to_vec());
            self.accept
        }
    }

    fn job() -> EnrichmentJob {
        EnrichmentJob::new(
            ImdbId::parse("tt1234567").unwrap(),
            RatingKey::parse("456").unwrap(),
        )
    }

    fn words(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("keyword{}", i)).collect()
    }

    #[tokio::test]
    async fn test_success_reports_count() {
        let sink = Arc::new(RecordingSink { accept: true, ..Default::default() });
        let task = EnrichmentTask::new(
            Arc::new(FixedSource(vec!["a".to_string(), "b".to_string()])),
            sink.clone(),
        );

        let result = task.run_attempt(&job()).await.unwrap();
        assert!(result.message.contains("Updated 2 labels"));
        assert_eq!(result.labels, vec!["a", "b"]);
        assert_eq!(sink.written.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_keywords_is_error_and_skips_write() {
        let sink = Arc::new(RecordingSink { accept: true, ..Default::default() });
        let task = EnrichmentTask::new(Arc::new(FixedSource(vec![])), sink.clone());

        let err = task.run_attempt(&job()).await.unwrap_err();
        assert_eq!(err, TaskError::NoKeywords("tt1234567".to_string()));
        assert!(sink.written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_keywords_count_as_none() {
        let sink = Arc::new(RecordingSink { accept: true, ..Default::default() });
        let task = EnrichmentTask::new(
            Arc::new(FixedSource(vec!["".to_string(), "  ".to_string()])),
            sink,
        );

        assert!(matches!(
            task.run_attempt(&job()).await,
            Err(TaskError::NoKeywords(_))
        ));
    }

    #[tokio::test]
    async fn test_truncates_to_fifty() {
        let sink = Arc::new(RecordingSink { accept: true, ..Default::default() });
        let task = EnrichmentTask::new(Arc::new(FixedSource(words(80))), sink.clone());

        let result = task.run_attempt(&job()).await.unwrap();
        assert_eq!(result.labels.len(), MAX_LABELS);
        assert_eq!(sink.written.lock().unwrap()[0].len(), MAX_LABELS);
        assert_eq!(result.labels[49], "keyword49");
    }

    #[tokio::test]
    async fn test_write_failure_is_error() {
        let sink = Arc::new(RecordingSink { accept: false, ..Default::default() });
        let task = EnrichmentTask::new(Arc::new(FixedSource(words(3))), sink);

        let err = task.run_attempt(&job()).await.unwrap_err();
        assert_eq!(err, TaskError::LabelWriteFailed("456".to_string()));
    }
}
