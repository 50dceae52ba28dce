//! GitHub REST API client.

use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::ScmError;
use crate::{ChangeStatus, ChangedFile, GitApi, RepoCoordinates, TreeEntry};

const GITHUB_API_URL: &str = "https://api.github.com";
/// Tree and compare calls page through large repositories.
const SLOW_TIMEOUT: Duration = Duration::from_secs(30);
const FAST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct GitHubApi {
    client: reqwest::Client,
    api_url: String,
    coordinates: RepoCoordinates,
    token: String,
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct ContentResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompareResponse {
    #[serde(default)]
    files: Vec<CompareFile>,
}

#[derive(Deserialize)]
struct CompareFile {
    filename: String,
    status: String,
}

impl GitHubApi {
    pub fn new(
        coordinates: RepoCoordinates,
        token: &str,
        api_url: Option<String>,
    ) -> Result<Self, ScmError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("faultline-indexer/1.0"));

        let client = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self {
            client,
            api_url: api_url.unwrap_or_else(|| GITHUB_API_URL.to_string()),
            coordinates,
            token: token.to_string(),
        })
    }

    async fn get(&self, path: &str, timeout: Duration) -> Result<reqwest::Response, ScmError> {
        let url = format!("{}{path}", self.api_url);
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .timeout(timeout)
            .send()
            .await?;

        match response.status().as_u16() {
            401 | 403 => Err(ScmError::Auth("invalid or expired token".into())),
            404 => Err(ScmError::NotFound(url)),
            status if !response.status().is_success() => Err(ScmError::Api {
                provider: "github",
                message: format!("status {status} for {url}"),
            }),
            _ => Ok(response),
        }
    }
}

#[async_trait::async_trait]
impl GitApi for GitHubApi {
    async fn get_latest_commit(&self, branch: &str) -> Result<String, ScmError> {
        let path = format!(
            "/repos/{}/{}/commits/{branch}",
            self.coordinates.owner, self.coordinates.name
        );
        let commit: CommitResponse = self.get(&path, FAST_TIMEOUT).await?.json().await?;
        debug!(sha = %commit.sha, branch, "latest commit");
        Ok(commit.sha)
    }

    async fn get_repository_tree(&self, branch: &str) -> Result<Vec<TreeEntry>, ScmError> {
        let path = format!(
            "/repos/{}/{}/git/trees/{branch}?recursive=1",
            self.coordinates.owner, self.coordinates.name
        );
        let tree: TreeResponse = self.get(&path, SLOW_TIMEOUT).await?.json().await?;
        Ok(tree
            .tree
            .into_iter()
            .map(|item| TreeEntry {
                is_file: item.kind == "blob",
                path: item.path,
            })
            .collect())
    }

    async fn get_file_content(&self, path: &str, reference: &str) -> Result<String, ScmError> {
        let api_path = format!(
            "/repos/{}/{}/contents/{path}?ref={reference}",
            self.coordinates.owner, self.coordinates.name
        );
        let content: ContentResponse = self.get(&api_path, FAST_TIMEOUT).await?.json().await?;
        let encoded = content.content.ok_or_else(|| ScmError::Api {
            provider: "github",
            message: format!("no content for {path}"),
        })?;

        // GitHub wraps the base64 body at 60 columns.
        let stripped: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&stripped)
            .map_err(|e| ScmError::Decode { path: path.to_string(), message: e.to_string() })?;
        String::from_utf8(bytes)
            .map_err(|e| ScmError::Decode { path: path.to_string(), message: e.to_string() })
    }

    async fn compare_commits(
        &self,
        base: &str,
        head: &str,
    ) -> Result<Vec<ChangedFile>, ScmError> {
        let path = format!(
            "/repos/{}/{}/compare/{base}...{head}",
            self.coordinates.owner, self.coordinates.name
        );
        let compare: CompareResponse = self.get(&path, SLOW_TIMEOUT).await?.json().await?;
        Ok(compare
            .files
            .into_iter()
            .map(|file| ChangedFile {
                status: match file.status.as_str() {
                    "added" | "copied" => ChangeStatus::Added,
                    "renamed" => ChangeStatus::Renamed,
                    "removed" => ChangeStatus::Removed,
                    _ => ChangeStatus::Modified,
                },
                path: file.filename,
            })
            .collect())
    }
}
