//! Error taxonomy shared by the platform crates.

use thiserror::Error;

/// Result alias used throughout the core crates.
pub type Result<T> = std::result::Result<T, Error>;

/// The error kinds the core distinguishes.
///
/// The HTTP surface maps each variant to a status code; the processing
/// pipeline and the scheduler count `Parse` and per-item failures instead
/// of propagating them.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request, bad enum value, missing required field.
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Invalid lifecycle transition or an already-running task.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Bad ingestion token or missing upstream credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A collaborator (search backend, Git API, LLM, vector store) failed.
    #[error("upstream {service} error: {message}")]
    Upstream { service: &'static str, message: String },

    /// Unparseable input; recorded as a per-item failure, never fatal.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invariant violation. Logged with full context, surfaced as 500.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream { service, message: message.into() }
    }

    /// Whether the operation may be retried against the same collaborator.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream { .. })
    }
}
