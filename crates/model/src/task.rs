//! Task execution audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The background tasks the scheduler dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskName {
    LogFetch,
    RcaGeneration,
    CodeIndexing,
}

impl TaskName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LogFetch => "log_fetch",
            Self::RcaGeneration => "rca_generation",
            Self::CodeIndexing => "code_indexing",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "log_fetch" => Ok(Self::LogFetch),
            "rca_generation" => Ok(Self::RcaGeneration),
            "code_indexing" => Ok(Self::CodeIndexing),
            other => Err(Error::Validation(format!("unknown task name: {other}"))),
        }
    }
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Success,
    Failed,
}

/// Append-only record of one task run. The `running` row doubles as the
/// single-flight lock for its `(service_id, task_name)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub execution_id: u64,
    pub service_id: String,
    pub task_name: TaskName,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_name_roundtrip() {
        for name in [TaskName::LogFetch, TaskName::RcaGeneration, TaskName::CodeIndexing] {
            assert_eq!(TaskName::parse(name.as_str()).unwrap(), name);
        }
        assert!(TaskName::parse("cleanup").is_err());
    }
}
