//! Enrichment workflow
//!
//! Webhook or manual request → [`JobQueue::enqueue`] → durable job row →
//! [`JobRunner`] worker → [`EnrichmentTask`] (IMDb fetch → Plex label write).

pub mod enrichment;
pub mod queue;

pub use enrichment::{EnrichmentTask, TaskError, TaskSuccess, MAX_LABELS};
pub use queue::{JobOutcome, JobQueue, JobRunner, RetryPolicy};
