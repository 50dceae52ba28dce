//! Exception clusters and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which frame grammar a stack frame was parsed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    Java,
    Python,
}

/// One parsed stack-trace frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Qualified symbol (`com.foo.Bar.baz`) or function name.
    pub symbol: String,
    /// File name or path as it appeared in the trace.
    pub file: String,
    pub line: u32,
    pub frame_type: FrameType,
}

impl StackFrame {
    /// Frame signature used for fingerprinting; line numbers are ignored
    /// so that shifted code still groups together.
    pub fn signature(&self) -> String {
        format!("{}:{}", self.file, self.symbol)
    }
}

/// Cluster triage state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Active,
    Skipped,
    Resolved,
}

impl ClusterStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Skipped => "skipped",
            Self::Resolved => "resolved",
        }
    }

    /// Parse a user-supplied status. Unknown values are a validation error.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "skipped" => Ok(Self::Skipped),
            "resolved" => Ok(Self::Resolved),
            other => Err(Error::Validation(format!("invalid cluster status: {other}"))),
        }
    }
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived severity shown on cluster details, from size and 24h frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// An equivalence class of exceptions, keyed by `fingerprint_static` and
/// scoped to a `(service, log_source)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionCluster {
    pub cluster_id: String,
    pub service_id: String,
    pub log_source_id: String,
    pub exception_type: String,
    pub exception_message: String,
    /// Primary clustering key.
    pub fingerprint_static: String,
    /// Secondary fingerprints, present only for clusters formed from
    /// records without stack traces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint_semantic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_terms: Vec<String>,
    pub representative_log_id: Option<String>,
    pub stack_trace: Vec<StackFrame>,
    pub logger_path: String,
    pub cluster_size: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub frequency_24h: u64,
    pub frequency_7d: u64,
    pub status: ClusterStatus,
    pub status_updated_at: Option<DateTime<Utc>>,
    pub status_updated_by: Option<String>,
    pub has_rca: bool,
    pub rca_generated_at: Option<DateTime<Utc>>,
}

impl ExceptionCluster {
    /// Apply a validated lifecycle transition. Same-status transitions are
    /// idempotent successes; `status_updated_at` still advances.
    pub fn transition(&mut self, to: ClusterStatus, updated_by: &str, now: DateTime<Utc>) {
        self.status = to;
        self.status_updated_at = Some(now);
        self.status_updated_by = Some(updated_by.to_string());
    }

    pub fn severity(&self) -> ClusterSeverity {
        if self.cluster_size > 100 || self.frequency_24h > 50 {
            ClusterSeverity::Critical
        } else if self.cluster_size > 50 || self.frequency_24h > 20 {
            ClusterSeverity::High
        } else if self.cluster_size > 10 || self.frequency_24h > 5 {
            ClusterSeverity::Medium
        } else {
            ClusterSeverity::Low
        }
    }
}

/// Payload for the atomic get-or-create cluster upsert.
///
/// Carries the representative exception of a fingerprint group; the store
/// only consults these fields when no cluster exists for the key yet.
#[derive(Debug, Clone)]
pub struct NewCluster {
    pub service_id: String,
    pub log_source_id: String,
    pub fingerprint_static: String,
    pub exception_type: String,
    pub exception_message: String,
    pub fingerprint_semantic: Option<String>,
    pub fingerprint_category: Option<String>,
    pub error_category: Option<String>,
    pub key_terms: Vec<String>,
    pub representative_log_id: Option<String>,
    pub stack_trace: Vec<StackFrame>,
    pub logger_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(size: u64, freq: u64) -> ExceptionCluster {
        ExceptionCluster {
            cluster_id: "cluster_1".into(),
            service_id: "svc_1".into(),
            log_source_id: "src_1".into(),
            exception_type: "NullPointerException".into(),
            exception_message: "boom".into(),
            fingerprint_static: "abcd".into(),
            fingerprint_semantic: None,
            fingerprint_category: None,
            error_category: None,
            key_terms: vec![],
            representative_log_id: None,
            stack_trace: vec![],
            logger_path: "com.foo.Bar".into(),
            cluster_size: size,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            frequency_24h: freq,
            frequency_7d: freq,
            status: ClusterStatus::Active,
            status_updated_at: None,
            status_updated_by: None,
            has_rca: false,
            rca_generated_at: None,
        }
    }

    #[test]
    fn test_status_parse_rejects_unknown() {
        assert!(ClusterStatus::parse("active").is_ok());
        assert!(matches!(
            ClusterStatus::parse("archived"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_transition_records_actor_and_time() {
        let mut c = cluster(1, 1);
        let now = Utc::now();
        c.transition(ClusterStatus::Skipped, "alice", now);
        assert_eq!(c.status, ClusterStatus::Skipped);
        assert_eq!(c.status_updated_by.as_deref(), Some("alice"));
        assert_eq!(c.status_updated_at, Some(now));
    }

    #[test]
    fn test_idempotent_transition_advances_timestamp() {
        let mut c = cluster(1, 1);
        let t1 = Utc::now();
        c.transition(ClusterStatus::Resolved, "alice", t1);
        let t2 = t1 + chrono::Duration::seconds(5);
        c.transition(ClusterStatus::Resolved, "alice", t2);
        assert_eq!(c.status, ClusterStatus::Resolved);
        assert_eq!(c.status_updated_at, Some(t2));
    }

    #[test]
    fn test_severity_thresholds() {
        assert_eq!(cluster(2, 2).severity(), ClusterSeverity::Low);
        assert_eq!(cluster(11, 0).severity(), ClusterSeverity::Medium);
        assert_eq!(cluster(0, 21).severity(), ClusterSeverity::High);
        assert_eq!(cluster(101, 0).severity(), ClusterSeverity::Critical);
        assert_eq!(cluster(0, 51).severity(), ClusterSeverity::Critical);
    }

    #[test]
    fn test_frame_signature_ignores_line() {
        let a = StackFrame {
            symbol: "com.foo.Bar.baz".into(),
            file: "Bar.java".into(),
            line: 42,
            frame_type: FrameType::Java,
        };
        let b = StackFrame { line: 99, ..a.clone() };
        assert_eq!(a.signature(), b.signature());
    }
}
