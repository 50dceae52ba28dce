//! The relational adapter contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{
    ClusterStatus, CodeBlock, ConnectionStatus, ExceptionCluster, IndexingMetadata,
    IndexingStatus, LogSource, NewCluster, RcaResult, Result, Service, TaskExecution, TaskName,
    TaskStatus, TimeFilter,
};
use serde_json::Value;

/// Filter for cluster listings; `None` fields are unconstrained.
#[derive(Debug, Clone, Default)]
pub struct ClusterFilter {
    pub status: Option<ClusterStatus>,
    pub service_id: Option<String>,
    pub log_source_id: Option<String>,
    pub time_filter: Option<TimeFilter>,
}

/// Outcome of the atomic cluster get-or-create.
#[derive(Debug, Clone)]
pub struct ClusterUpsert {
    pub cluster: ExceptionCluster,
    /// Whether this call inserted the row (as opposed to updating it).
    pub created: bool,
}

/// Aggregated execution history for one `(service, task)` pair.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TaskStats {
    pub total_executions: u64,
    pub successful: u64,
    pub failed: u64,
    pub running: u64,
    pub success_rate: f64,
}

/// Relational storage operations.
///
/// All cross-entity navigation goes through id lookups here; entities hold
/// no references to each other. Mutating operations are atomic per entity
/// key — concurrent callers observe either the previous or the next state,
/// never a mix.
#[async_trait]
pub trait MetaStore: Send + Sync {
    // Services.
    async fn insert_service(&self, service: Service) -> Result<()>;
    async fn get_service(&self, service_id: &str) -> Result<Service>;
    async fn get_service_by_name(&self, name: &str) -> Result<Option<Service>>;
    async fn list_services(&self, active_only: bool) -> Result<Vec<Service>>;
    /// Soft-deactivate; scheduling stops, history is preserved.
    async fn set_service_active(&self, service_id: &str, active: bool) -> Result<()>;
    /// Record that a task ran, updating the matching `last_*` field.
    async fn touch_service_last_run(
        &self,
        service_id: &str,
        task: TaskName,
        at: DateTime<Utc>,
    ) -> Result<()>;
    async fn update_indexing_state(
        &self,
        service_id: &str,
        status: IndexingStatus,
        last_indexed_commit: Option<String>,
    ) -> Result<()>;
    /// Delete a service and cascade to its log sources.
    async fn delete_service(&self, service_id: &str) -> Result<()>;

    // Log sources.
    async fn insert_log_source(&self, source: LogSource) -> Result<()>;
    async fn get_log_source(&self, log_source_id: &str) -> Result<LogSource>;
    /// Sources for a service; `fetchable_only` keeps active + fetch-enabled.
    async fn list_log_sources(&self, service_id: &str, fetchable_only: bool)
        -> Result<Vec<LogSource>>;
    async fn update_source_fetch_state(
        &self,
        log_source_id: &str,
        status: ConnectionStatus,
        last_fetch_at: Option<DateTime<Utc>>,
        last_error: Option<String>,
    ) -> Result<()>;

    // Clusters.
    /// Atomic get-or-create keyed by
    /// `(service_id, log_source_id, fingerprint_static)`. An existing row
    /// is updated in place: size and frequency counters grow by
    /// `group_size`, `last_seen` takes the max of stored and `now`.
    async fn upsert_cluster(
        &self,
        new: NewCluster,
        group_size: u64,
        now: DateTime<Utc>,
    ) -> Result<ClusterUpsert>;
    async fn get_cluster(&self, cluster_id: &str) -> Result<ExceptionCluster>;
    /// Matching clusters ordered by `last_seen` descending.
    async fn list_clusters(&self, filter: &ClusterFilter) -> Result<Vec<ExceptionCluster>>;
    async fn update_cluster_status(
        &self,
        cluster_id: &str,
        status: ClusterStatus,
        updated_by: &str,
    ) -> Result<ExceptionCluster>;
    async fn mark_rca_generated(&self, cluster_id: &str, at: DateTime<Utc>) -> Result<()>;

    // Code blocks.
    async fn insert_code_blocks(&self, blocks: Vec<CodeBlock>) -> Result<()>;
    async fn get_code_block(&self, block_id: &str) -> Result<Option<CodeBlock>>;
    async fn delete_service_code_blocks(&self, service_id: &str) -> Result<u64>;
    /// Delete-then-insert for one file in a single critical section, so
    /// readers never observe a half-replaced file.
    async fn replace_file_code_blocks(
        &self,
        service_id: &str,
        file_path: &str,
        blocks: Vec<CodeBlock>,
    ) -> Result<u64>;
    async fn count_code_blocks(&self, service_id: &str) -> Result<u64>;

    // Indexing metadata.
    async fn get_indexing_metadata(
        &self,
        service_id: &str,
        repository: &str,
    ) -> Result<Option<IndexingMetadata>>;
    async fn upsert_indexing_metadata(&self, metadata: IndexingMetadata) -> Result<()>;

    // RCA results.
    async fn insert_rca(&self, rca: RcaResult) -> Result<()>;
    async fn latest_rca(&self, cluster_id: &str) -> Result<Option<RcaResult>>;
    async fn list_rca(&self, cluster_id: &str) -> Result<Vec<RcaResult>>;
    /// Fold a feedback score into the latest RCA's validation score.
    async fn apply_rca_feedback(&self, cluster_id: &str, score: f64) -> Result<RcaResult>;

    // Task executions.
    /// Claim the single-flight slot for `(service_id, task_name)`.
    /// Returns the new execution id, or `None` when a `running` row
    /// already exists — the insert is the lock.
    async fn claim_task(
        &self,
        service_id: &str,
        task: TaskName,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>>;
    async fn complete_task(
        &self,
        execution_id: u64,
        status: TaskStatus,
        stats: Option<Value>,
        error_message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()>;
    /// Completion time of the most recent successful run.
    async fn last_successful_execution(
        &self,
        service_id: &str,
        task: TaskName,
    ) -> Result<Option<DateTime<Utc>>>;
    async fn list_task_executions(
        &self,
        service_id: &str,
        task: Option<TaskName>,
        limit: usize,
    ) -> Result<Vec<TaskExecution>>;
    async fn task_stats(
        &self,
        service_id: &str,
        task: TaskName,
        since: DateTime<Utc>,
    ) -> Result<TaskStats>;
}
