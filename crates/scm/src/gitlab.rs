//! GitLab REST API client.
//!
//! GitLab addresses projects by URL-encoded `owner%2Frepo` path rather
//! than separate owner/repo segments, and its compare endpoint reports
//! diffs with per-file flags instead of a status string.

use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::ScmError;
use crate::{ChangeStatus, ChangedFile, GitApi, RepoCoordinates, TreeEntry};

const GITLAB_API_URL: &str = "https://gitlab.com/api/v4";
const SLOW_TIMEOUT: Duration = Duration::from_secs(30);
const FAST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct GitLabApi {
    client: reqwest::Client,
    api_url: String,
    project: String,
}

#[derive(Deserialize)]
struct CommitResponse {
    id: String,
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct FileResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompareResponse {
    #[serde(default)]
    diffs: Vec<Diff>,
}

#[derive(Deserialize)]
struct Diff {
    new_path: String,
    #[serde(default)]
    new_file: bool,
    #[serde(default)]
    renamed_file: bool,
    #[serde(default)]
    deleted_file: bool,
}

impl GitLabApi {
    pub fn new(
        coordinates: RepoCoordinates,
        token: &str,
        api_url: Option<String>,
    ) -> Result<Self, ScmError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "PRIVATE-TOKEN",
            HeaderValue::from_str(token)
                .map_err(|_| ScmError::Auth("token contains invalid header bytes".into()))?,
        );
        let client = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self {
            client,
            api_url: api_url.unwrap_or_else(|| GITLAB_API_URL.to_string()),
            project: urlencoding::encode(&coordinates.path()).into_owned(),
        })
    }

    async fn get(&self, path: &str, timeout: Duration) -> Result<reqwest::Response, ScmError> {
        let url = format!("{}{path}", self.api_url);
        let response = self.client.get(&url).timeout(timeout).send().await?;
        match response.status().as_u16() {
            401 | 403 => Err(ScmError::Auth("invalid or expired token".into())),
            404 => Err(ScmError::NotFound(url)),
            status if !response.status().is_success() => Err(ScmError::Api {
                provider: "gitlab",
                message: format!("status {status} for {url}"),
            }),
            _ => Ok(response),
        }
    }
}

#[async_trait::async_trait]
impl GitApi for GitLabApi {
    async fn get_latest_commit(&self, branch: &str) -> Result<String, ScmError> {
        let path = format!("/projects/{}/repository/commits/{branch}", self.project);
        let commit: CommitResponse = self.get(&path, FAST_TIMEOUT).await?.json().await?;
        debug!(sha = %commit.id, branch, "latest commit");
        Ok(commit.id)
    }

    async fn get_repository_tree(&self, branch: &str) -> Result<Vec<TreeEntry>, ScmError> {
        // GitLab pages tree listings; walk until a short page.
        let mut entries = Vec::new();
        let mut page = 1u32;
        loop {
            let path = format!(
                "/projects/{}/repository/tree?ref={branch}&recursive=true&per_page=100&page={page}",
                self.project
            );
            let items: Vec<TreeItem> = self.get(&path, SLOW_TIMEOUT).await?.json().await?;
            let count = items.len();
            entries.extend(items.into_iter().map(|item| TreeEntry {
                is_file: item.kind == "blob",
                path: item.path,
            }));
            if count < 100 {
                break;
            }
            page += 1;
        }
        Ok(entries)
    }

    async fn get_file_content(&self, path: &str, reference: &str) -> Result<String, ScmError> {
        let api_path = format!(
            "/projects/{}/repository/files/{}?ref={reference}",
            self.project,
            urlencoding::encode(path)
        );
        let file: FileResponse = self.get(&api_path, FAST_TIMEOUT).await?.json().await?;
        let encoded = file.content.ok_or_else(|| ScmError::Api {
            provider: "gitlab",
            message: format!("no content for {path}"),
        })?;
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
            "/projects/{}/repository/compare?from={base}&to={head}",
            self.project
        );
        let compare: CompareResponse = self.get(&path, SLOW_TIMEOUT).await?.json().await?;
        Ok(compare
            .diffs
            .into_iter()
            .map(|diff| ChangedFile {
                status: if diff.deleted_file {
                    ChangeStatus::Removed
                } else if diff.new_file {
                    ChangeStatus::Added
                } else if diff.renamed_file {
                    ChangeStatus::Renamed
                } else {
                    ChangeStatus::Modified
                },
                path: diff.new_path,
            })
            .collect())
    }
}
