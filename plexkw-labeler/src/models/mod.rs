//! Data models for plexkw-labeler

pub mod job;

pub use job::{EnrichmentJob, JobState};
