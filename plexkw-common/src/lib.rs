//! # plexkw common library
//!
//! Shared code for the Plex keyword labeler:
//! - Error and result types
//! - Layered configuration (CLI → ENV → TOML → defaults)
//! - Tracing subscriber setup
//! - IMDb id / Plex rating key validation
//! - Free-text sanitisation for logs and responses

pub mod config;
pub mod error;
pub mod logging;
pub mod sanitize;
pub mod validate;

pub use error::{Error, Result};
pub use validate::{ImdbId, RatingKey};
