//! Repository back-ends: local filesystem walk and remote Git API.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use scm::{GitApi, RepoCoordinates};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::IndexError;
use crate::exclude::is_excluded;
use crate::extract::Language;

/// What the indexing flow needs from a repository, regardless of where
/// the bytes live.
#[async_trait]
pub trait RepoBackend: Send + Sync + std::fmt::Debug {
    /// Repository display name, used as the metadata key.
    fn repository(&self) -> &str;
    /// Version label (branch or operator-supplied).
    fn version(&self) -> &str;
    async fn current_commit(&self) -> Result<String, IndexError>;
    async fn list_candidate_files(
        &self,
        languages: &[Language],
    ) -> Result<Vec<String>, IndexError>;
    async fn read_file(&self, path: &str) -> Result<String, IndexError>;
    /// Files changed between two commits. `None` means the backend cannot
    /// tell, which makes the indexer fall back to a full run; `Some(vec![])`
    /// means genuinely nothing changed.
    async fn changed_files_between(
        &self,
        old: &str,
        new: &str,
        languages: &[Language],
    ) -> Result<Option<Vec<String>>, IndexError>;
}

/// Reads from a tree the operator keeps checked out. No Git writes ever
/// happen here; pulling is the operator's job.
#[derive(Debug)]
pub struct LocalBackend {
    root: PathBuf,
    repository: String,
    version: String,
}

impl LocalBackend {
    pub fn new(repo_path: &str, version: &str) -> Result<Self, IndexError> {
        let root = PathBuf::from(repo_path);
        if !root.is_dir() {
            return Err(IndexError::BadRepoPath(repo_path.to_string()));
        }
        let repository = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| repo_path.to_string());
        Ok(Self { root, repository, version: version.to_string() })
    }

    /// Resolve HEAD by reading the `.git` plumbing files directly. Falls
    /// back to a hash of the version label when the tree is not a git
    /// checkout; that is fine for local mode.
    fn read_git_head(&self) -> Option<String> {
        let git_dir = self.root.join(".git");
        let head = std::fs::read_to_string(git_dir.join("HEAD")).ok()?;
        let head = head.trim();

        if let Some(reference) = head.strip_prefix("ref: ") {
            if let Ok(sha) = std::fs::read_to_string(git_dir.join(reference)) {
                return Some(sha.trim().to_string());
            }
            // Ref may only exist in packed-refs.
            let packed = std::fs::read_to_string(git_dir.join("packed-refs")).ok()?;
            for line in packed.lines() {
                if let Some((sha, name)) = line.split_once(' ') {
                    if name.trim() == reference {
                        return Some(sha.trim().to_string());
                    }
                }
            }
            return None;
        }

        // Detached HEAD holds the SHA directly.
        (head.len() == 40 && head.chars().all(|c| c.is_ascii_hexdigit()))
            .then(|| head.to_string())
    }

    fn walk(&self, dir: &Path, extensions: &[&str], files: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let relative_str = relative.to_string_lossy().replace('\\', "/");
            if is_excluded(&relative_str) {
                continue;
            }
            if path.is_dir() {
                self.walk(&path, extensions, files);
            } else if extensions.iter().any(|ext| relative_str.ends_with(ext)) {
                files.push(relative_str);
            }
        }
    }
}

#[async_trait]
impl RepoBackend for LocalBackend {
    fn repository(&self) -> &str {
        &self.repository
    }

    fn version(&self) -> &str {
        &self.version
    }

    async fn current_commit(&self) -> Result<String, IndexError> {
        if let Some(sha) = self.read_git_head() {
            debug!(sha = %sha[..sha.len().min(8)], "commit from git HEAD");
            return Ok(sha);
        }
        let digest = Sha256::digest(self.version.as_bytes());
        let fallback = hex::encode(&digest[..4]);
        info!(fallback, "no git metadata, using version-hash commit identity");
        Ok(fallback)
    }

    async fn list_candidate_files(
        &self,
        languages: &[Language],
    ) -> Result<Vec<String>, IndexError> {
        let extensions: Vec<&str> = languages.iter().map(|l| l.extension()).collect();
        let mut files = Vec::new();
        self.walk(&self.root, &extensions, &mut files);
        files.sort();
        info!(files = files.len(), "local candidate files");
        Ok(files)
    }

    async fn read_file(&self, path: &str) -> Result<String, IndexError> {
        std::fs::read_to_string(self.root.join(path)).map_err(|e| IndexError::Read {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    async fn changed_files_between(
        &self,
        _old: &str,
        _new: &str,
        _languages: &[Language],
    ) -> Result<Option<Vec<String>>, IndexError> {
        // Without Git plumbing for diffs the local backend cannot tell
        // what changed; let the indexer run full.
        warn!("local backend cannot diff commits, forcing full index");
        Ok(None)
    }
}

/// Reads everything from a provider API; nothing touches local disk.
pub struct ApiBackend {
    api: Box<dyn GitApi>,
    repository: String,
    branch: String,
}

impl std::fmt::Debug for ApiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiBackend")
            .field("repository", &self.repository)
            .field("branch", &self.branch)
            .finish_non_exhaustive()
    }
}

impl ApiBackend {
    pub fn new(api: Box<dyn GitApi>, coordinates: &RepoCoordinates, branch: &str) -> Self {
        Self {
            api,
            repository: coordinates.name.clone(),
            branch: branch.to_string(),
        }
    }
}

#[async_trait]
impl RepoBackend for ApiBackend {
    fn repository(&self) -> &str {
        &self.repository
    }

    fn version(&self) -> &str {
        &self.branch
    }

    async fn current_commit(&self) -> Result<String, IndexError> {
        // Always fetched fresh; the remote is the source of truth.
        Ok(self.api.get_latest_commit(&self.branch).await?)
    }

    async fn list_candidate_files(
        &self,
        languages: &[Language],
    ) -> Result<Vec<String>, IndexError> {
        let extensions: Vec<&str> = languages.iter().map(|l| l.extension()).collect();
        let tree = self.api.get_repository_tree(&self.branch).await?;
        let files: Vec<String> = tree
            .into_iter()
            .filter(|entry| entry.is_file)
            .map(|entry| entry.path)
            .filter(|path| extensions.iter().any(|ext| path.ends_with(ext)))
            .filter(|path| !is_excluded(path))
            .collect();
        info!(files = files.len(), "api candidate files");
        Ok(files)
    }

    async fn read_file(&self, path: &str) -> Result<String, IndexError> {
        Ok(self.api.get_file_content(path, &self.branch).await?)
    }

    async fn changed_files_between(
        &self,
        old: &str,
        new: &str,
        languages: &[Language],
    ) -> Result<Option<Vec<String>>, IndexError> {
        let extensions: Vec<&str> = languages.iter().map(|l| l.extension()).collect();
        let changed = self.api.compare_commits(old, new).await?;
        let files: Vec<String> = changed
            .into_iter()
            .filter(|file| file.status.is_indexable())
            .map(|file| file.path)
            .filter(|path| extensions.iter().any(|ext| path.ends_with(ext)))
            .filter(|path| !is_excluded(path))
            .collect();
        debug!(files = files.len(), old, new, "changed files");
        Ok(Some(files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_backend_requires_directory() {
        assert!(matches!(
            LocalBackend::new("/definitely/not/here", "main"),
            Err(IndexError::BadRepoPath(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            LocalBackend::new(file.to_str().unwrap(), "main"),
            Err(IndexError::BadRepoPath(_))
        ));
    }

    #[tokio::test]
    async fn test_local_walk_excludes_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("target/classes")).unwrap();
        std::fs::write(root.join("src/cart.py"), "def f():\n    pass\n").unwrap();
        std::fs::write(root.join("src/Cart.java"), "class Cart {}\n").unwrap();
        std::fs::write(root.join("src/notes.txt"), "skip me").unwrap();
        std::fs::write(root.join("target/classes/Cart.java"), "generated").unwrap();

        let backend = LocalBackend::new(root.to_str().unwrap(), "main").unwrap();
        let files = backend
            .list_candidate_files(&[Language::Python, Language::Java])
            .await
            .unwrap();
        assert_eq!(files, vec!["src/Cart.java", "src/cart.py"]);
    }

    #[tokio::test]
    async fn test_local_commit_fallback_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path().to_str().unwrap(), "v1.2").unwrap();
        let a = backend.current_commit().await.unwrap();
        let b = backend.current_commit().await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);

        let other = LocalBackend::new(dir.path().to_str().unwrap(), "v1.3").unwrap();
        assert_ne!(a, other.current_commit().await.unwrap());
    }

    #[tokio::test]
    async fn test_local_commit_from_git_head() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join(".git/refs/heads")).unwrap();
        std::fs::write(root.join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::write(
            root.join(".git/refs/heads/main"),
            "0123456789abcdef0123456789abcdef01234567\n",
        )
        .unwrap();

        let backend = LocalBackend::new(root.to_str().unwrap(), "main").unwrap();
        assert_eq!(
            backend.current_commit().await.unwrap(),
            "0123456789abcdef0123456789abcdef01234567"
        );
    }
}
