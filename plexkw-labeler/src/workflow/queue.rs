//! Durable enrichment job queue and worker pool
//!
//! Jobs are rows in the queue database. Enqueue inserts a row and wakes a
//! worker; HTTP handlers never wait for more than that insert. Retries are
//! explicit state transitions on the row (attempt count, `run_at`), giving
//! at-least-once execution across restarts.
//!
//! Jobs for the same item are not serialized: two concurrent jobs for one
//! rating key may race and the last successful write wins.

use chrono::{DateTime, Utc};
use plexkw_common::{Error, ImdbId, RatingKey, Result};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::enrichment::{EnrichmentTask, TaskSuccess};
use crate::db::jobs;
use crate::models::{EnrichmentJob, JobState};

/// Longest a worker sleeps without checking for due jobs
const POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Shortest sleep, so an idle worker never spins
const MIN_WAIT: Duration = Duration::from_millis(10);

/// Retry ceiling and backoff for enrichment jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Fixed delay before each retry
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(300),
        }
    }
}

/// Handle for enqueuing and inspecting jobs
#[derive(Clone)]
pub struct JobQueue {
    db: SqlitePool,
    notify: Arc<Notify>,
}

impl JobQueue {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Persist a new job and wake a worker; returns the task id
    pub async fn enqueue(&self, imdb_id: ImdbId, rating_key: RatingKey) -> Result<Uuid> {
        let job = EnrichmentJob::new(imdb_id, rating_key);
        jobs::insert_job(&self.db, &job).await?;
        self.notify.notify_one();

        tracing::info!(
            event = "task_queued",
            task_id = %job.job_id,
            imdb_id = %job.imdb_id,
            rating_key = %job.rating_key,
            "Enrichment job queued"
        );

        Ok(job.job_id)
    }

    /// Current record for a task id
    pub async fn get(&self, job_id: Uuid) -> Result<Option<EnrichmentJob>> {
        jobs::load_job(&self.db, job_id).await
    }

    /// Connectivity check against the queue database
    pub async fn ping(&self) -> Result<()> {
        jobs::ping(&self.db).await
    }
}

/// What happened to a claimed job
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Succeeded {
        job_id: Uuid,
        attempt: u32,
        result: TaskSuccess,
    },
    Retrying {
        job_id: Uuid,
        attempt: u32,
        run_at: DateTime<Utc>,
        error: String,
    },
    Failed {
        job_id: Uuid,
        attempt: u32,
        error: String,
    },
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Succeeded { .. } => JobState::Succeeded,
            JobOutcome::Retrying { .. } => JobState::Retrying,
            JobOutcome::Failed { .. } => JobState::Failed,
        }
    }
}

/// Outcome of an attempt whose state write has not reached the database yet
#[derive(Debug, Clone)]
struct PendingTransition {
    job_id: Uuid,
    state: JobState,
    last_error: Option<String>,
    run_at: DateTime<Utc>,
}

/// Claims due jobs and drives them through the state machine
///
/// A job this runner claimed stays RUNNING until its outcome is written. When
/// that write fails with a database error the outcome is kept and written
/// again before the next claim.
pub struct JobRunner {
    queue: JobQueue,
    task: EnrichmentTask,
    policy: RetryPolicy,
    pending: Mutex<Vec<PendingTransition>>,
}

impl JobRunner {
    pub fn new(queue: JobQueue, task: EnrichmentTask, policy: RetryPolicy) -> Self {
        Self {
            queue,
            task,
            policy,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Resume jobs a previous process left RUNNING
    pub async fn recover(&self) -> Result<()> {
        let (requeued, failed) =
            jobs::recover_interrupted(&self.queue.db, self.policy.max_attempts, Utc::now()).await?;

        if requeued > 0 || failed > 0 {
            tracing::warn!(
                event = "tasks_recovered",
                requeued,
                failed,
                "Recovered enrichment jobs interrupted by shutdown"
            );
        }

        Ok(())
    }

    /// Claim and run at most one due job
    ///
    /// Returns `None` when nothing is due.
    pub async fn run_next(&self) -> Result<Option<JobOutcome>> {
        self.flush_pending().await?;

        let Some(job) = jobs::claim_next_due(&self.queue.db, Utc::now()).await? else {
            return Ok(None);
        };

        let outcome = match self.task.run_attempt(&job).await {
            Ok(result) => {
                self.record(job.job_id, JobState::Succeeded, None, Utc::now())
                    .await?;
                JobOutcome::Succeeded {
                    job_id: job.job_id,
                    attempt: job.attempt,
                    result,
                }
            }
            Err(err) => self.handle_failure(&job, err.to_string()).await?,
        };

        Ok(Some(outcome))
    }

    /// Write an attempt's outcome, keeping it for a later write on database errors
    async fn record(
        &self,
        job_id: Uuid,
        state: JobState,
        last_error: Option<&str>,
        run_at: DateTime<Utc>,
    ) -> Result<()> {
        let transition = PendingTransition {
            job_id,
            state,
            last_error: last_error.map(str::to_string),
            run_at,
        };

        match self.write_transition(&transition).await {
            Err(e @ Error::Database(_)) => {
                tracing::warn!(
                    event = "task_transition_deferred",
                    task_id = %job_id,
                    state = %state,
                    error = %e,
                    "Failed to record job state, will retry"
                );
                self.lock_pending().push(transition);
                Err(e)
            }
            other => other,
        }
    }

    /// Retry outcome writes that failed earlier
    ///
    /// Transitions that still fail with a database error stay pending and the
    /// first such error is returned.
    async fn flush_pending(&self) -> Result<()> {
        let pending = std::mem::take(&mut *self.lock_pending());
        if pending.is_empty() {
            return Ok(());
        }

        let mut still_pending = Vec::new();
        let mut first_error = None;

        for transition in pending {
            match self.write_transition(&transition).await {
                Ok(()) => {
                    tracing::info!(
                        event = "task_transition_recorded",
                        task_id = %transition.job_id,
                        state = %transition.state,
                        "Recorded deferred job state"
                    );
                }
                Err(e @ Error::Database(_)) => {
                    still_pending.push(transition);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    // Job is no longer RUNNING; nothing left to write
                    tracing::warn!(
                        task_id = %transition.job_id,
                        error = %e,
                        "Dropping deferred job state"
                    );
                }
            }
        }

        self.lock_pending().extend(still_pending);

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn write_transition(&self, transition: &PendingTransition) -> Result<()> {
        jobs::record_transition(
            &self.queue.db,
            transition.job_id,
            transition.state,
            transition.last_error.as_deref(),
            transition.run_at,
        )
        .await
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Vec<PendingTransition>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn handle_failure(&self, job: &EnrichmentJob, error: String) -> Result<JobOutcome> {
        tracing::warn!(
            event = "task_error",
            task_id = %job.job_id,
            imdb_id = %job.imdb_id,
            rating_key = %job.rating_key,
            attempt = job.attempt,
            error = %error,
            "Enrichment attempt failed"
        );

        match JobState::after_failure(job.attempt, self.policy.max_attempts) {
            JobState::Retrying => {
                let delay = chrono::Duration::from_std(self.policy.retry_delay)
                    .map_err(|e| Error::Internal(format!("Invalid retry delay: {}", e)))?;
                let run_at = Utc::now() + delay;

                self.record(job.job_id, JobState::Retrying, Some(&error), run_at)
                    .await?;

                tracing::info!(
                    event = "task_retry_scheduled",
                    task_id = %job.job_id,
                    next_attempt = job.attempt + 1,
                    max_attempts = self.policy.max_attempts,
                    run_at = %run_at,
                    "Enrichment retry scheduled"
                );

                Ok(JobOutcome::Retrying {
                    job_id: job.job_id,
                    attempt: job.attempt,
                    run_at,
                    error,
                })
            }
            _ => {
                self.record(job.job_id, JobState::Failed, Some(&error), Utc::now())
                    .await?;

                tracing::error!(
                    event = "task_failed",
                    task_id = %job.job_id,
                    imdb_id = %job.imdb_id,
                    rating_key = %job.rating_key,
                    attempts = job.attempt,
                    final_error = %error,
                    "Enrichment abandoned after final attempt"
                );

                Ok(JobOutcome::Failed {
                    job_id: job.job_id,
                    attempt: job.attempt,
                    error,
                })
            }
        }
    }

    /// Start `count` workers that run until `cancel` fires
    pub fn spawn_workers(self: &Arc<Self>, count: usize, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        (0..count)
            .map(|worker_id| {
                let runner = Arc::clone(self);
                let cancel = cancel.clone();
                tokio::spawn(async move { runner.worker_loop(worker_id, cancel).await })
            })
            .collect()
    }

    async fn worker_loop(&self, worker_id: usize, cancel: CancellationToken) {
        tracing::info!(worker_id, "Enrichment worker started");

        while !cancel.is_cancelled() {
            let wait = match self.run_next().await {
                // More work may be due right away
                Ok(Some(_)) => continue,
                Ok(None) => self.idle_wait().await,
                Err(e) => {
                    tracing::error!(worker_id, error = %e, "Enrichment worker failed to process job");
                    POLL_INTERVAL
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.queue.notify.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }

        tracing::info!(worker_id, "Enrichment worker stopped");
    }

    /// Time until the earliest pending job is due, capped at the poll interval
    async fn idle_wait(&self) -> Duration {
        match jobs::next_due_in_ms(&self.queue.db, Utc::now()).await {
            Ok(Some(ms)) => Duration::from_millis(ms as u64).clamp(MIN_WAIT, POLL_INTERVAL),
            Ok(None) => POLL_INTERVAL,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read next due job");
                POLL_INTERVAL
            }
        }
    }
}
