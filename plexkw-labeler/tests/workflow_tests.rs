//! Enrichment job queue and retry state machine tests
//!
//! Uses an in-memory queue database with stub keyword source and label sink.

use async_trait::async_trait;
use plexkw_common::{ImdbId, RatingKey};
use plexkw_labeler::db::{init_database_pool, jobs};
use plexkw_labeler::models::JobState;
use plexkw_labeler::services::{KeywordSource, LabelSink};
use plexkw_labeler::workflow::{EnrichmentTask, JobOutcome, JobQueue, JobRunner, RetryPolicy};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct CountingSource {
    keywords: Vec<String>,
    calls: AtomicUsize,
}

impl CountingSource {
    fn new(keywords: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeywordSource for CountingSource {
    async fn fetch_keywords(&self, _imdb_id: &str) -> Vec<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.keywords.clone()
    }
}

struct StubSink {
    accept: bool,
    writes: Mutex<Vec<(String, Vec<String>)>>,
}

impl StubSink {
    fn new(accept: bool) -> Arc<Self> {
        Arc::new(Self {
            accept,
            writes: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LabelSink for StubSink {
    async fn write_labels(&self, rating_key: &str, labels: &[String]) -> bool {
        self.writes
            .lock()
            .unwrap()
            .push((rating_key.to_string(), labels.to_vec()));
        self.accept
    }
}

fn no_delay() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        retry_delay: Duration::ZERO,
    }
}

async fn setup(
    source: Arc<CountingSource>,
    sink: Arc<StubSink>,
    policy: RetryPolicy,
) -> (JobQueue, Arc<JobRunner>) {
    let pool = init_database_pool("sqlite::memory:").await.unwrap();
    let queue = JobQueue::new(pool);
    let task = EnrichmentTask::new(source, sink);
    let runner = Arc::new(JobRunner::new(queue.clone(), task, policy));
    (queue, runner)
}

fn ids() -> (ImdbId, RatingKey) {
    (
        ImdbId::parse("tt0111161").unwrap(),
        RatingKey::parse("12345").unwrap(),
    )
}

#[tokio::test]
async fn test_success_reports_label_count() {
    let source = CountingSource::new(&["a", "b"]);
    let sink = StubSink::new(true);
    let (queue, runner) = setup(source.clone(), sink.clone(), no_delay()).await;

    let (imdb_id, rating_key) = ids();
    let task_id = queue.enqueue(imdb_id, rating_key).await.unwrap();

    match runner.run_next().await.unwrap() {
        Some(JobOutcome::Succeeded {
            job_id,
            attempt,
            result,
        }) => {
            assert_eq!(job_id, task_id);
            assert_eq!(attempt, 1);
            assert!(result.message.contains('2'), "message: {}", result.message);
            assert_eq!(result.labels, vec!["a", "b"]);
        }
        other => panic!("expected success, got {:?}", other),
    }

    let job = queue.get(task_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(
        *sink.writes.lock().unwrap(),
        vec![("12345".to_string(), vec!["a".to_string(), "b".to_string()])]
    );
}

#[tokio::test]
async fn test_empty_keywords_retried_then_abandoned() {
    let source = CountingSource::new(&[]);
    let sink = StubSink::new(true);
    let (queue, runner) = setup(source.clone(), sink.clone(), no_delay()).await;

    let (imdb_id, rating_key) = ids();
    let task_id = queue.enqueue(imdb_id, rating_key).await.unwrap();

    let first = runner.run_next().await.unwrap().unwrap();
    assert_eq!(first.state(), JobState::Retrying);
    let second = runner.run_next().await.unwrap().unwrap();
    assert_eq!(second.state(), JobState::Retrying);

    match runner.run_next().await.unwrap() {
        Some(JobOutcome::Failed { attempt, error, .. }) => {
            assert_eq!(attempt, 3);
            assert_eq!(error, "No keywords found for IMDb ID: tt0111161");
        }
        other => panic!("expected failure, got {:?}", other),
    }

    // Nothing left to run
    assert!(runner.run_next().await.unwrap().is_none());
    assert_eq!(source.calls(), 3);
    assert!(sink.writes.lock().unwrap().is_empty());

    let job = queue.get(task_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempt, 3);
}

#[tokio::test]
async fn test_rejected_write_is_retryable() {
    let source = CountingSource::new(&["prison"]);
    let sink = StubSink::new(false);
    let policy = RetryPolicy {
        max_attempts: 2,
        retry_delay: Duration::ZERO,
    };
    let (queue, runner) = setup(source, sink, policy).await;

    let (imdb_id, rating_key) = ids();
    let task_id = queue.enqueue(imdb_id, rating_key).await.unwrap();

    match runner.run_next().await.unwrap() {
        Some(JobOutcome::Retrying { error, .. }) => {
            assert_eq!(error, "Failed to update Plex labels for rating key: 12345");
        }
        other => panic!("expected retry, got {:?}", other),
    }
    assert_eq!(runner.run_next().await.unwrap().unwrap().state(), JobState::Failed);

    let job = queue.get(task_id).await.unwrap().unwrap();
    assert_eq!(
        job.last_error.as_deref(),
        Some("Failed to update Plex labels for rating key: 12345")
    );
}

#[tokio::test]
async fn test_retry_waits_for_backoff() {
    let source = CountingSource::new(&[]);
    let sink = StubSink::new(true);
    let (queue, runner) = setup(source.clone(), sink, RetryPolicy::default()).await;

    let (imdb_id, rating_key) = ids();
    let task_id = queue.enqueue(imdb_id, rating_key).await.unwrap();

    match runner.run_next().await.unwrap() {
        Some(JobOutcome::Retrying { run_at, .. }) => {
            let delay = run_at - chrono::Utc::now();
            assert!(delay > chrono::Duration::seconds(290));
        }
        other => panic!("expected retry, got {:?}", other),
    }

    // Next attempt is five minutes out
    assert!(runner.run_next().await.unwrap().is_none());
    assert_eq!(source.calls(), 1);

    let job = queue.get(task_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Retrying);
}

#[tokio::test]
async fn test_recover_resumes_interrupted_job() {
    let source = CountingSource::new(&["a"]);
    let sink = StubSink::new(true);
    let pool = init_database_pool("sqlite::memory:").await.unwrap();
    let queue = JobQueue::new(pool.clone());
    let runner = JobRunner::new(
        queue.clone(),
        EnrichmentTask::new(source, sink),
        no_delay(),
    );

    let (imdb_id, rating_key) = ids();
    let task_id = queue.enqueue(imdb_id, rating_key).await.unwrap();

    // Simulate a crash mid-attempt: claimed but never finished
    jobs::claim_next_due(&pool, chrono::Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert!(runner.run_next().await.unwrap().is_none());

    runner.recover().await.unwrap();
    match runner.run_next().await.unwrap() {
        Some(JobOutcome::Succeeded { job_id, attempt, .. }) => {
            assert_eq!(job_id, task_id);
            assert_eq!(attempt, 2);
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_workers_pick_up_enqueued_jobs() {
    let source = CountingSource::new(&["a", "b", "c"]);
    let sink = StubSink::new(true);
    let (queue, runner) = setup(source, sink.clone(), no_delay()).await;

    let cancel = CancellationToken::new();
    let workers = runner.spawn_workers(2, cancel.clone());

    let (imdb_id, rating_key) = ids();
    let task_id = queue.enqueue(imdb_id, rating_key).await.unwrap();

    let finished = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let job = queue.get(task_id).await.unwrap().unwrap();
            if job.state.is_terminal() {
                return job.state;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(finished, JobState::Succeeded);
    assert_eq!(sink.writes.lock().unwrap().len(), 1);

    cancel.cancel();
    for worker in workers {
        tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap();
    }
}

const BLOCK_OUTCOMES_TRIGGER: &str = r#"
    CREATE TRIGGER block_outcomes BEFORE UPDATE ON enrichment_jobs
    WHEN NEW.state != 'RUNNING'
    BEGIN
        SELECT RAISE(ABORT, 'database is locked');
    END
"#;

#[tokio::test]
async fn test_failed_outcome_write_is_retried_before_next_claim() {
    let source = CountingSource::new(&["a", "b"]);
    let sink = StubSink::new(true);
    let pool = init_database_pool("sqlite::memory:").await.unwrap();
    let queue = JobQueue::new(pool.clone());
    let runner = JobRunner::new(
        queue.clone(),
        EnrichmentTask::new(source.clone(), sink.clone()),
        no_delay(),
    );

    let (imdb_id, rating_key) = ids();
    let task_id = queue.enqueue(imdb_id, rating_key).await.unwrap();

    // Claims still go through; recording any outcome fails
    sqlx::query(BLOCK_OUTCOMES_TRIGGER).execute(&pool).await.unwrap();

    assert!(runner.run_next().await.is_err());
    let job = queue.get(task_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Running);

    // Write still blocked: the outcome stays pending
    assert!(runner.run_next().await.is_err());

    sqlx::query("DROP TRIGGER block_outcomes")
        .execute(&pool)
        .await
        .unwrap();

    assert!(runner.run_next().await.unwrap().is_none());

    let job = queue.get(task_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(job.attempt, 1);
    assert_eq!(source.calls(), 1);
    assert_eq!(sink.writes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_deferred_retry_is_claimed_again() {
    let source = CountingSource::new(&[]);
    let sink = StubSink::new(true);
    let pool = init_database_pool("sqlite::memory:").await.unwrap();
    let queue = JobQueue::new(pool.clone());
    let runner = JobRunner::new(
        queue.clone(),
        EnrichmentTask::new(source.clone(), sink),
        no_delay(),
    );

    let (imdb_id, rating_key) = ids();
    let task_id = queue.enqueue(imdb_id, rating_key).await.unwrap();

    sqlx::query(BLOCK_OUTCOMES_TRIGGER).execute(&pool).await.unwrap();
    assert!(runner.run_next().await.is_err());
    sqlx::query("DROP TRIGGER block_outcomes")
        .execute(&pool)
        .await
        .unwrap();

    match runner.run_next().await.unwrap() {
        Some(JobOutcome::Retrying { job_id, attempt, .. }) => {
            assert_eq!(job_id, task_id);
            assert_eq!(attempt, 2);
        }
        other => panic!("expected second attempt, got {:?}", other),
    }
    assert_eq!(source.calls(), 2);
}
