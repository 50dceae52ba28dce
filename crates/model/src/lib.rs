//! Shared domain types for the faultline platform.
//!
//! Every entity is addressed by an opaque string identifier and navigated
//! through store lookups rather than in-object references. The types here
//! carry no storage or transport concerns; adapters live in the `store`
//! crate and the HTTP surface in the `server` crate.

pub mod cluster;
pub mod code;
pub mod error;
pub mod record;
pub mod rca;
pub mod service;
pub mod task;
pub mod timefilter;

pub use cluster::{
    ClusterSeverity, ClusterStatus, ExceptionCluster, FrameType, NewCluster, StackFrame,
};
pub use code::{CodeBlock, IndexingMetadata, IndexingMode, IndexingStatus, SymbolType};
pub use error::{Error, Result};
pub use record::LogRecord;
pub use rca::{InvolvedParameter, RcaResult, SupportingEvidence};
pub use service::{ConnectionStatus, GitProvider, LogSource, Service, SourceType};
pub use task::{TaskExecution, TaskName, TaskStatus};
pub use timefilter::TimeFilter;

/// Generate an opaque identifier with the given prefix, e.g. `cluster_ab12…`.
pub fn prefixed_id(prefix: &str) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..12])
}
