//! Unified Git API abstraction for GitHub and GitLab.
//!
//! API-mode code indexing never clones: it reads commit identity, file
//! trees, file contents, and commit comparisons straight from the
//! provider's REST API. Both providers sit behind the [`GitApi`] trait;
//! unsupported providers are rejected at construction.

pub mod error;
pub mod github;
pub mod gitlab;

pub use error::ScmError;
pub use github::GitHubApi;
pub use gitlab::GitLabApi;

use async_trait::async_trait;
use model::GitProvider;
use regex::Regex;
use std::sync::LazyLock;

/// `owner/repo` parsed from a repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinates {
    pub owner: String,
    pub name: String,
}

impl RepoCoordinates {
    pub fn path(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Matches the trailing `owner/repo(.git)` of both https and ssh remotes.
static REPO_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[:/]([^/:]+)/([^/]+?)(?:\.git)?/?$").expect("repo url pattern")
});

/// Extract `owner/repo` from a repository URL.
///
/// Accepts `https://github.com/owner/repo.git`,
/// `git@gitlab.com:owner/repo.git`, and bare `host/owner/repo` forms.
pub fn parse_repository_url(url: &str) -> Result<RepoCoordinates, ScmError> {
    let captures = REPO_URL
        .captures(url.trim())
        .ok_or_else(|| ScmError::UrlParse(url.to_string()))?;
    Ok(RepoCoordinates {
        owner: captures[1].to_string(),
        name: captures[2].to_string(),
    })
}

/// One entry of a recursive repository tree listing.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub path: String,
    /// `blob` for files, `tree` for directories.
    pub is_file: bool,
}

/// How a file changed between two commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Added,
    Modified,
    Renamed,
    Removed,
}

impl ChangeStatus {
    /// Whether the file should be (re)indexed. Removed files are excluded;
    /// their blocks are dropped by the per-file replace instead.
    pub fn is_indexable(self) -> bool {
        !matches!(self, Self::Removed)
    }
}

#[derive(Debug, Clone)]
pub struct ChangedFile {
    pub path: String,
    pub status: ChangeStatus,
}

/// The provider dialect the API-mode indexer consumes.
#[async_trait]
pub trait GitApi: Send + Sync {
    /// Latest commit SHA on a branch.
    async fn get_latest_commit(&self, branch: &str) -> Result<String, ScmError>;
    /// Recursive tree listing at a branch.
    async fn get_repository_tree(&self, branch: &str) -> Result<Vec<TreeEntry>, ScmError>;
    /// Decoded file content at a ref.
    async fn get_file_content(&self, path: &str, reference: &str) -> Result<String, ScmError>;
    /// Changed files between two commits.
    async fn compare_commits(&self, base: &str, head: &str)
        -> Result<Vec<ChangedFile>, ScmError>;
}

/// Build the client for a provider. The provider enum already excludes
/// anything unsupported, so this cannot fail for Bitbucket-style inputs —
/// those are rejected earlier, when the provider string is parsed.
pub fn create_client(
    provider: GitProvider,
    coordinates: RepoCoordinates,
    token: &str,
) -> Result<Box<dyn GitApi>, ScmError> {
    match provider {
        GitProvider::Github => Ok(Box::new(GitHubApi::new(coordinates, token, None)?)),
        GitProvider::Gitlab => Ok(Box::new(GitLabApi::new(coordinates, token, None)?)),
    }
}
