//! The error kinds shared across every component (§7). Crate-local error
//! enums wrap this one with `#[from]` rather than duplicating the kinds.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("concurrent update on {0}")]
    ConcurrentUpdate(String),

    #[error("transient error: {0}")]
    Transient(#[source] anyhow::Error),

    /// A persisted, never-retried config error (§7). Carries the message
    /// that was cached so every subsequent caller sees the same text.
    #[error("cached permanent error: {0}")]
    CachedPermanent(String),

    #[error("canceled")]
    Canceled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl SchedError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        SchedError::NotFound(what.to_string())
    }

    pub fn invalid_argument(what: impl std::fmt::Display) -> Self {
        SchedError::InvalidArgument(what.to_string())
    }

    pub fn is_retryable_locally(&self) -> bool {
        matches!(self, SchedError::ConcurrentUpdate(_) | SchedError::Transient(_))
    }
}

pub type SchedResult<T> = Result<T, SchedError>;
