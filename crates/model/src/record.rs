//! Canonical log record shape produced by the normalizer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A log record normalized to the canonical shape.
///
/// Source backends emit heterogeneous documents; the normalizer maps them
/// onto this struct. Fields the pipeline does not recognize are preserved
/// in `extra` as pass-through metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Stable identifier; derived from content when the source has none.
    pub log_id: String,
    /// Timestamp as reported by the source (ISO-8601 where available).
    pub timestamp: String,
    /// Upper-case level after alias mapping (`WARN` → `WARNING`, …).
    pub level: String,
    pub message: String,
    pub logger: String,
    pub thread: String,
    pub service: String,
    /// Ordered stack-trace lines, when the record carried any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<Vec<String>>,
    /// Unrecognized source fields, passed through untouched.
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl LogRecord {
    /// Whether the record's level is in the given processing set.
    pub fn level_in(&self, levels: &[String]) -> bool {
        levels.iter().any(|l| l == &self.level)
    }
}
