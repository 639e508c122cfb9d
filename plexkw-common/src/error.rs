//! Common error types for plexkw

use thiserror::Error;

/// Common result type for plexkw operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the labeler crates
#[derive(Error, Debug)]
pub enum Error {
    /// Task queue database error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid identifier or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
