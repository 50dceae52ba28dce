//! Indexer error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// Local mode: the configured tree is missing or not a directory.
    #[error("repository path is not a readable directory: {0}")]
    BadRepoPath(String),

    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error(transparent)]
    Scm(#[from] scm::ScmError),

    #[error("source parse failed for {path}: {message}")]
    Parse { path: String, message: String },

    #[error(transparent)]
    Store(#[from] model::Error),
}

impl From<IndexError> for model::Error {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::BadRepoPath(p) => model::Error::Validation(format!(
                "repository path does not exist or is not a directory: {p}"
            )),
            IndexError::Scm(e) => e.into(),
            IndexError::Store(e) => e,
            IndexError::Parse { path, message } => {
                model::Error::Parse(format!("{path}: {message}"))
            }
            IndexError::Read { path, message } => {
                model::Error::upstream("repository", format!("{path}: {message}"))
            }
        }
    }
}
