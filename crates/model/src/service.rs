//! Tenant services and their log sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::code::IndexingStatus;
use crate::error::{Error, Result};

/// Supported Git hosting providers for API-mode indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitProvider {
    Github,
    Gitlab,
}

impl GitProvider {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Self::Github),
            "gitlab" => Ok(Self::Gitlab),
            other => Err(Error::Validation(format!(
                "unsupported git provider: {other} (supported: github, gitlab)"
            ))),
        }
    }
}

/// Log backend kinds a source can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Opensearch,
    Elasticsearch,
    Loki,
    Cloudwatch,
    Splunk,
    Fluentd,
    Syslog,
}

/// Last observed health of a log source connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Error,
    Unknown,
}

/// A tenant. Soft-deactivated (`is_active = false`) rather than deleted
/// when scheduling should stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub service_id: String,
    pub name: String,
    pub is_active: bool,

    // Code source configuration.
    pub repository_url: Option<String>,
    pub git_branch: String,
    pub git_provider: Option<GitProvider>,
    /// Local checkout to walk, local mode only.
    pub git_repo_path: Option<String>,
    /// Git API token, API mode only.
    pub access_token: Option<String>,
    pub use_api_mode: bool,

    // Processing toggles.
    pub log_processing_enabled: bool,
    pub rca_generation_enabled: bool,
    pub code_indexing_enabled: bool,

    // Duration knobs. Only one of the log-fetch fields need be set;
    // minutes wins on tie.
    pub log_fetch_duration_minutes: Option<u64>,
    pub log_fetch_duration_hours: Option<u64>,
    pub log_fetch_duration_days: Option<u64>,
    pub rca_generation_interval_minutes: u64,

    // Observed state.
    pub last_log_fetch: Option<DateTime<Utc>>,
    pub last_rca_generation: Option<DateTime<Utc>>,
    pub last_code_indexing: Option<DateTime<Utc>>,
    pub code_indexing_status: IndexingStatus,
    pub last_indexed_commit: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Service {
    /// Validate the code-source invariants: exactly one of `git_repo_path`
    /// and `access_token`, consistent with `use_api_mode`, and a supported
    /// provider when API mode is on.
    pub fn validate(&self) -> Result<()> {
        if self.use_api_mode {
            if self.access_token.is_none() {
                return Err(Error::Validation(
                    "API mode requires access_token".into(),
                ));
            }
            if self.git_repo_path.is_some() {
                return Err(Error::Validation(
                    "API mode must not set git_repo_path".into(),
                ));
            }
            if self.git_provider.is_none() {
                return Err(Error::Validation(
                    "API mode requires git_provider (github or gitlab)".into(),
                ));
            }
        } else {
            if self.git_repo_path.is_none() {
                return Err(Error::Validation(
                    "local mode requires git_repo_path".into(),
                ));
            }
            if self.access_token.is_some() {
                return Err(Error::Validation(
                    "local mode must not set access_token".into(),
                ));
            }
        }
        Ok(())
    }

    /// Effective log-fetch look-back. Minutes wins when several are set.
    pub fn log_fetch_duration(&self) -> chrono::Duration {
        if let Some(m) = self.log_fetch_duration_minutes {
            chrono::Duration::minutes(m as i64)
        } else if let Some(h) = self.log_fetch_duration_hours {
            chrono::Duration::hours(h as i64)
        } else if let Some(d) = self.log_fetch_duration_days {
            chrono::Duration::days(d as i64)
        } else {
            chrono::Duration::minutes(30)
        }
    }
}

/// A configured log backend belonging to a service. Deleted together with
/// its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSource {
    pub log_source_id: String,
    pub service_id: String,
    pub source_type: SourceType,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_ssl: bool,
    pub verify_certs: bool,
    pub index_pattern: String,
    pub query_filter: Option<serde_json::Value>,
    pub is_active: bool,
    pub fetch_enabled: bool,
    /// Clamped to `[1, 1440]` at the API edge.
    pub fetch_interval_minutes: u32,
    pub connection_status: ConnectionStatus,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl LogSource {
    pub fn base_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> Service {
        Service {
            service_id: "svc_1".into(),
            name: "checkout".into(),
            is_active: true,
            repository_url: Some("https://github.com/acme/checkout".into()),
            git_branch: "main".into(),
            git_provider: Some(GitProvider::Github),
            git_repo_path: None,
            access_token: Some("token".into()),
            use_api_mode: true,
            log_processing_enabled: true,
            rca_generation_enabled: true,
            code_indexing_enabled: true,
            log_fetch_duration_minutes: None,
            log_fetch_duration_hours: None,
            log_fetch_duration_days: None,
            rca_generation_interval_minutes: 60,
            last_log_fetch: None,
            last_rca_generation: None,
            last_code_indexing: None,
            code_indexing_status: IndexingStatus::NotIndexed,
            last_indexed_commit: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_api_mode_requires_token_and_provider() {
        let svc = service();
        assert!(svc.validate().is_ok());

        let mut svc = service();
        svc.access_token = None;
        assert!(svc.validate().is_err());

        let mut svc = service();
        svc.git_provider = None;
        assert!(svc.validate().is_err());
    }

    #[test]
    fn test_local_mode_excludes_token() {
        let mut svc = service();
        svc.use_api_mode = false;
        svc.access_token = None;
        svc.git_repo_path = Some("/srv/repos/checkout".into());
        assert!(svc.validate().is_ok());

        svc.access_token = Some("token".into());
        assert!(svc.validate().is_err());
    }

    #[test]
    fn test_fetch_duration_minutes_wins() {
        let mut svc = service();
        svc.log_fetch_duration_minutes = Some(15);
        svc.log_fetch_duration_hours = Some(2);
        assert_eq!(svc.log_fetch_duration(), chrono::Duration::minutes(15));

        svc.log_fetch_duration_minutes = None;
        assert_eq!(svc.log_fetch_duration(), chrono::Duration::hours(2));
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!(GitProvider::parse("GitHub").unwrap(), GitProvider::Github);
        assert!(GitProvider::parse("bitbucket").is_err());
    }
}
