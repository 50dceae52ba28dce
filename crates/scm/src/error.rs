//! Error types for Git API clients.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScmError {
    /// Invalid or expired token (HTTP 401/403).
    #[error("git API authentication failed: {0}")]
    Auth(String),

    /// Repository, ref, or path does not exist or is not accessible.
    #[error("not found on git API: {0}")]
    NotFound(String),

    /// Transport-level failure.
    #[error("git API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with something unexpected.
    #[error("unexpected {provider} response: {message}")]
    Api {
        provider: &'static str,
        message: String,
    },

    /// `repository_url` did not contain an `owner/repo` tail.
    #[error("could not parse repository URL: {0}")]
    UrlParse(String),

    /// Base64 or UTF-8 decoding of file content failed.
    #[error("could not decode file content for {path}: {message}")]
    Decode { path: String, message: String },
}

impl From<ScmError> for model::Error {
    fn from(err: ScmError) -> Self {
        match err {
            ScmError::Auth(msg) => model::Error::Auth(msg),
            ScmError::NotFound(msg) => model::Error::not_found("git_ref", msg),
            other => model::Error::upstream("git_api", other.to_string()),
        }
    }
}
