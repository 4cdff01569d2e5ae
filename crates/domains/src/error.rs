//! # DomainError
//!
//! Centralized error handling for the board.
//! Every failure aborts the enclosing transaction; nothing is retried.

use thiserror::Error;

/// The primary error type for all verify/post/vote operations.
#[derive(Error, Debug)]
pub enum DomainError {
    /// Malformed or missing input, blacklisted content.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Trust-state violation (restricted, cooldown, unverified, CAPTCHA,
    /// ticket mismatch, reputation denial). The message is shown to the caller.
    #[error("{0}")]
    Forbidden(String),

    /// Unknown identity, post or thread.
    #[error("{0} not found")]
    NotFound(String),

    /// Storage or remote-service failure.
    #[error("internal service error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for DomainError {
    fn from(err: anyhow::Error) -> Self {
        DomainError::Internal(format!("{err:#}"))
    }
}

/// A specialized Result type for board logic.
pub type Result<T> = std::result::Result<T, DomainError>;
