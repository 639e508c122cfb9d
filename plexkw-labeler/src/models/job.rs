//! Enrichment job record and state machine
//!
//! State progression:
//! QUEUED → RUNNING → SUCCEEDED
//!                  → RETRYING → RUNNING → ...
//!                  → FAILED
//!
//! RETRYING is entered only on a failed attempt while `attempt < max_attempts`.

use chrono::{DateTime, Utc};
use plexkw_common::{Error, ImdbId, RatingKey, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Enrichment job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    /// Waiting for its first attempt
    Queued,
    /// Claimed by a worker
    Running,
    /// Waiting for `run_at` before the next attempt
    Retrying,
    /// Labels written
    Succeeded,
    /// Abandoned after the retry ceiling
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "QUEUED",
            JobState::Running => "RUNNING",
            JobState::Retrying => "RETRYING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Retrying, Running)
                | (Running, Succeeded)
                | (Running, Retrying)
                | (Running, Failed)
        )
    }

    /// State after a failed attempt numbered `attempt` (1-based)
    pub fn after_failure(attempt: u32, max_attempts: u32) -> JobState {
        if attempt < max_attempts {
            JobState::Retrying
        } else {
            JobState::Failed
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "QUEUED" => Ok(JobState::Queued),
            "RUNNING" => Ok(JobState::Running),
            "RETRYING" => Ok(JobState::Retrying),
            "SUCCEEDED" => Ok(JobState::Succeeded),
            "FAILED" => Ok(JobState::Failed),
            other => Err(Error::Internal(format!("Unknown job state: {}", other))),
        }
    }
}

/// One queued unit of fetch-then-write work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentJob {
    /// Task id returned to HTTP callers; also the log correlation id
    pub job_id: Uuid,
    pub imdb_id: ImdbId,
    pub rating_key: RatingKey,
    pub state: JobState,
    /// Attempts started so far (0 while queued)
    pub attempt: u32,
    pub last_error: Option<String>,
    /// Earliest time the next attempt may start
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EnrichmentJob {
    /// Create a new job, due immediately
    pub fn new(imdb_id: ImdbId, rating_key: RatingKey) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            imdb_id,
            rating_key,
            state: JobState::Queued,
            attempt: 0,
            last_error: None,
            run_at: now,
            created_at: now,
            updated_at: now,
        }
    }
}
