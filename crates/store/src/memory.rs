//! In-memory reference implementation of [`MetaStore`].
//!
//! Arena-style: one map per entity, keyed by opaque id, behind a single
//! `RwLock`. Every mutating operation runs inside one write-lock critical
//! section, which is what makes the cluster upsert, the task claim, and
//! the per-file block replacement atomic.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{
    prefixed_id, ClusterStatus, CodeBlock, ConnectionStatus, Error, ExceptionCluster,
    IndexingMetadata, IndexingStatus, LogSource, NewCluster, RcaResult, Result, Service,
    TaskExecution, TaskName, TaskStatus,
};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::meta::{ClusterFilter, ClusterUpsert, MetaStore, TaskStats};

#[derive(Default)]
struct Inner {
    services: HashMap<String, Service>,
    log_sources: HashMap<String, LogSource>,
    clusters: HashMap<String, ExceptionCluster>,
    /// `(service_id, log_source_id, fingerprint_static)` → cluster id.
    cluster_index: HashMap<(String, String, String), String>,
    code_blocks: HashMap<String, CodeBlock>,
    /// `(service_id, repository)` → metadata.
    indexing_metadata: HashMap<(String, String), IndexingMetadata>,
    /// cluster id → RCA history, oldest first.
    rca_results: HashMap<String, Vec<RcaResult>>,
    executions: Vec<TaskExecution>,
    next_execution_id: u64,
}

/// In-memory store; cheap to clone, shared across tasks.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetaStore for MemoryStore {
    async fn insert_service(&self, service: Service) -> Result<()> {
        service.validate()?;
        let mut inner = self.inner.write().await;
        if inner.services.values().any(|s| s.name == service.name) {
            return Err(Error::Conflict(format!(
                "service name already exists: {}",
                service.name
            )));
        }
        inner.services.insert(service.service_id.clone(), service);
        Ok(())
    }

    async fn get_service(&self, service_id: &str) -> Result<Service> {
        self.inner
            .read()
            .await
            .services
            .get(service_id)
            .cloned()
            .ok_or_else(|| Error::not_found("service", service_id))
    }

    async fn get_service_by_name(&self, name: &str) -> Result<Option<Service>> {
        Ok(self
            .inner
            .read()
            .await
            .services
            .values()
            .find(|s| s.name == name)
            .cloned())
    }

    async fn list_services(&self, active_only: bool) -> Result<Vec<Service>> {
        let inner = self.inner.read().await;
        let mut services: Vec<Service> = inner
            .services
            .values()
            .filter(|s| !active_only || s.is_active)
            .cloned()
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(services)
    }

    async fn set_service_active(&self, service_id: &str, active: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        let service = inner
            .services
            .get_mut(service_id)
            .ok_or_else(|| Error::not_found("service", service_id))?;
        service.is_active = active;
        Ok(())
    }

    async fn touch_service_last_run(
        &self,
        service_id: &str,
        task: TaskName,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let service = inner
            .services
            .get_mut(service_id)
            .ok_or_else(|| Error::not_found("service", service_id))?;
        match task {
            TaskName::LogFetch => service.last_log_fetch = Some(at),
            TaskName::RcaGeneration => service.last_rca_generation = Some(at),
            TaskName::CodeIndexing => service.last_code_indexing = Some(at),
        }
        Ok(())
    }

    async fn update_indexing_state(
        &self,
        service_id: &str,
        status: IndexingStatus,
        last_indexed_commit: Option<String>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let service = inner
            .services
            .get_mut(service_id)
            .ok_or_else(|| Error::not_found("service", service_id))?;
        service.code_indexing_status = status;
        if last_indexed_commit.is_some() {
            service.last_indexed_commit = last_indexed_commit;
        }
        Ok(())
    }

    async fn delete_service(&self, service_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .services
            .remove(service_id)
            .ok_or_else(|| Error::not_found("service", service_id))?;
        inner.log_sources.retain(|_, s| s.service_id != service_id);
        Ok(())
    }

    async fn insert_log_source(&self, source: LogSource) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.services.contains_key(&source.service_id) {
            return Err(Error::not_found("service", &source.service_id));
        }
        inner
            .log_sources
            .insert(source.log_source_id.clone(), source);
        Ok(())
    }

    async fn get_log_source(&self, log_source_id: &str) -> Result<LogSource> {
        self.inner
            .read()
            .await
            .log_sources
            .get(log_source_id)
            .cloned()
            .ok_or_else(|| Error::not_found("log_source", log_source_id))
    }

    async fn list_log_sources(
        &self,
        service_id: &str,
        fetchable_only: bool,
    ) -> Result<Vec<LogSource>> {
        Ok(self
            .inner
            .read()
            .await
            .log_sources
            .values()
            .filter(|s| s.service_id == service_id)
            .filter(|s| !fetchable_only || (s.is_active && s.fetch_enabled))
            .cloned()
            .collect())
    }

    async fn update_source_fetch_state(
        &self,
        log_source_id: &str,
        status: ConnectionStatus,
        last_fetch_at: Option<DateTime<Utc>>,
        last_error: Option<String>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let source = inner
            .log_sources
            .get_mut(log_source_id)
            .ok_or_else(|| Error::not_found("log_source", log_source_id))?;
        source.connection_status = status;
        if last_fetch_at.is_some() {
            source.last_fetch_at = last_fetch_at;
        }
        source.last_error = last_error;
        Ok(())
    }

    async fn upsert_cluster(
        &self,
        new: NewCluster,
        group_size: u64,
        now: DateTime<Utc>,
    ) -> Result<ClusterUpsert> {
        let mut inner = self.inner.write().await;
        if !inner.log_sources.contains_key(&new.log_source_id) {
            return Err(Error::not_found("log_source", &new.log_source_id));
        }

        let key = (
            new.service_id.clone(),
            new.log_source_id.clone(),
            new.fingerprint_static.clone(),
        );

        if let Some(cluster_id) = inner.cluster_index.get(&key).cloned() {
            let cluster = inner
                .clusters
                .get_mut(&cluster_id)
                .ok_or_else(|| Error::Internal(format!("cluster index dangling: {cluster_id}")))?;
            cluster.cluster_size += group_size;
            cluster.frequency_24h += group_size;
            cluster.frequency_7d += group_size;
            cluster.first_seen = cluster.first_seen.min(now);
            cluster.last_seen = cluster.last_seen.max(now);
            debug!(cluster_id = %cluster.cluster_id, size = cluster.cluster_size, "updated cluster");
            return Ok(ClusterUpsert {
                cluster: cluster.clone(),
                created: false,
            });
        }

        let cluster = ExceptionCluster {
            cluster_id: prefixed_id("cluster"),
            service_id: new.service_id,
            log_source_id: new.log_source_id,
            exception_type: new.exception_type,
            exception_message: new.exception_message,
            fingerprint_static: new.fingerprint_static,
            fingerprint_semantic: new.fingerprint_semantic,
            fingerprint_category: new.fingerprint_category,
            error_category: new.error_category,
            key_terms: new.key_terms,
            representative_log_id: new.representative_log_id,
            stack_trace: new.stack_trace,
            logger_path: new.logger_path,
            cluster_size: group_size,
            first_seen: now,
            last_seen: now,
            frequency_24h: group_size,
            frequency_7d: group_size,
            status: ClusterStatus::Active,
            status_updated_at: None,
            status_updated_by: None,
            has_rca: false,
            rca_generated_at: None,
        };
        inner
            .cluster_index
            .insert(key, cluster.cluster_id.clone());
        inner
            .clusters
            .insert(cluster.cluster_id.clone(), cluster.clone());
        debug!(cluster_id = %cluster.cluster_id, size = group_size, "created cluster");
        Ok(ClusterUpsert { cluster, created: true })
    }

    async fn get_cluster(&self, cluster_id: &str) -> Result<ExceptionCluster> {
        self.inner
            .read()
            .await
            .clusters
            .get(cluster_id)
            .cloned()
            .ok_or_else(|| Error::not_found("cluster", cluster_id))
    }

    async fn list_clusters(&self, filter: &ClusterFilter) -> Result<Vec<ExceptionCluster>> {
        let now = Utc::now();
        let inner = self.inner.read().await;
        let mut clusters: Vec<ExceptionCluster> = inner
            .clusters
            .values()
            .filter(|c| filter.status.is_none_or(|s| c.status == s))
            .filter(|c| {
                filter
                    .service_id
                    .as_deref()
                    .is_none_or(|s| c.service_id == s)
            })
            .filter(|c| {
                filter
                    .log_source_id
                    .as_deref()
                    .is_none_or(|s| c.log_source_id == s)
            })
            .filter(|c| {
                filter
                    .time_filter
                    .as_ref()
                    .is_none_or(|t| t.contains(c.last_seen, now))
            })
            .cloned()
            .collect();
        clusters.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        Ok(clusters)
    }

    async fn update_cluster_status(
        &self,
        cluster_id: &str,
        status: ClusterStatus,
        updated_by: &str,
    ) -> Result<ExceptionCluster> {
        let mut inner = self.inner.write().await;
        let cluster = inner
            .clusters
            .get_mut(cluster_id)
            .ok_or_else(|| Error::not_found("cluster", cluster_id))?;
        cluster.transition(status, updated_by, Utc::now());
        Ok(cluster.clone())
    }

    async fn mark_rca_generated(&self, cluster_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let cluster = inner
            .clusters
            .get_mut(cluster_id)
            .ok_or_else(|| Error::not_found("cluster", cluster_id))?;
        cluster.has_rca = true;
        cluster.rca_generated_at = Some(at);
        Ok(())
    }

    async fn insert_code_blocks(&self, blocks: Vec<CodeBlock>) -> Result<()> {
        let mut inner = self.inner.write().await;
        for block in blocks {
            inner.code_blocks.insert(block.block_id.clone(), block);
        }
        Ok(())
    }

    async fn get_code_block(&self, block_id: &str) -> Result<Option<CodeBlock>> {
        Ok(self.inner.read().await.code_blocks.get(block_id).cloned())
    }

    async fn delete_service_code_blocks(&self, service_id: &str) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.code_blocks.len();
        inner.code_blocks.retain(|_, b| b.service_id != service_id);
        Ok((before - inner.code_blocks.len()) as u64)
    }

    async fn replace_file_code_blocks(
        &self,
        service_id: &str,
        file_path: &str,
        blocks: Vec<CodeBlock>,
    ) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.code_blocks.len();
        inner
            .code_blocks
            .retain(|_, b| !(b.service_id == service_id && b.file_path == file_path));
        let deleted = (before - inner.code_blocks.len()) as u64;
        for block in blocks {
            inner.code_blocks.insert(block.block_id.clone(), block);
        }
        Ok(deleted)
    }

    async fn count_code_blocks(&self, service_id: &str) -> Result<u64> {
        Ok(self
            .inner
            .read()
            .await
            .code_blocks
            .values()
            .filter(|b| b.service_id == service_id)
            .count() as u64)
    }

    async fn get_indexing_metadata(
        &self,
        service_id: &str,
        repository: &str,
    ) -> Result<Option<IndexingMetadata>> {
        Ok(self
            .inner
            .read()
            .await
            .indexing_metadata
            .get(&(service_id.to_string(), repository.to_string()))
            .cloned())
    }

    async fn upsert_indexing_metadata(&self, metadata: IndexingMetadata) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.indexing_metadata.insert(
            (metadata.service_id.clone(), metadata.repository.clone()),
            metadata,
        );
        Ok(())
    }

    async fn insert_rca(&self, rca: RcaResult) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .rca_results
            .entry(rca.cluster_id.clone())
            .or_default()
            .push(rca);
        Ok(())
    }

    async fn latest_rca(&self, cluster_id: &str) -> Result<Option<RcaResult>> {
        Ok(self
            .inner
            .read()
            .await
            .rca_results
            .get(cluster_id)
            .and_then(|history| history.last().cloned()))
    }

    async fn list_rca(&self, cluster_id: &str) -> Result<Vec<RcaResult>> {
        Ok(self
            .inner
            .read()
            .await
            .rca_results
            .get(cluster_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn apply_rca_feedback(&self, cluster_id: &str, score: f64) -> Result<RcaResult> {
        if !(0.0..=1.0).contains(&score) {
            return Err(Error::Validation(format!(
                "feedback score {score} is outside [0, 1]"
            )));
        }
        let mut inner = self.inner.write().await;
        let rca = inner
            .rca_results
            .get_mut(cluster_id)
            .and_then(|history| history.last_mut())
            .ok_or_else(|| Error::not_found("rca", cluster_id))?;
        rca.apply_feedback(score);
        Ok(rca.clone())
    }

    async fn claim_task(
        &self,
        service_id: &str,
        task: TaskName,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>> {
        let mut inner = self.inner.write().await;
        let running = inner.executions.iter().any(|e| {
            e.service_id == service_id && e.task_name == task && e.status == TaskStatus::Running
        });
        if running {
            return Ok(None);
        }
        inner.next_execution_id += 1;
        let execution_id = inner.next_execution_id;
        inner.executions.push(TaskExecution {
            execution_id,
            service_id: service_id.to_string(),
            task_name: task,
            started_at: now,
            completed_at: None,
            status: TaskStatus::Running,
            stats: None,
            error_message: None,
        });
        Ok(Some(execution_id))
    }

    async fn complete_task(
        &self,
        execution_id: u64,
        status: TaskStatus,
        stats: Option<Value>,
        error_message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if status == TaskStatus::Running {
            return Err(Error::Validation(
                "completion status must be success or failed".into(),
            ));
        }
        let mut inner = self.inner.write().await;
        let execution = inner
            .executions
            .iter_mut()
            .find(|e| e.execution_id == execution_id)
            .ok_or_else(|| Error::not_found("task_execution", execution_id.to_string()))?;
        execution.completed_at = Some(now);
        execution.status = status;
        execution.stats = stats;
        execution.error_message = error_message;
        Ok(())
    }

    async fn last_successful_execution(
        &self,
        service_id: &str,
        task: TaskName,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .inner
            .read()
            .await
            .executions
            .iter()
            .filter(|e| {
                e.service_id == service_id
                    && e.task_name == task
                    && e.status == TaskStatus::Success
            })
            .filter_map(|e| e.completed_at)
            .max())
    }

    async fn list_task_executions(
        &self,
        service_id: &str,
        task: Option<TaskName>,
        limit: usize,
    ) -> Result<Vec<TaskExecution>> {
        let inner = self.inner.read().await;
        let mut executions: Vec<TaskExecution> = inner
            .executions
            .iter()
            .filter(|e| e.service_id == service_id)
            .filter(|e| task.is_none_or(|t| e.task_name == t))
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        executions.truncate(limit);
        Ok(executions)
    }

    async fn task_stats(
        &self,
        service_id: &str,
        task: TaskName,
        since: DateTime<Utc>,
    ) -> Result<TaskStats> {
        let inner = self.inner.read().await;
        let mut stats = TaskStats::default();
        for execution in inner
            .executions
            .iter()
            .filter(|e| e.service_id == service_id && e.task_name == task && e.started_at >= since)
        {
            stats.total_executions += 1;
            match execution.status {
                TaskStatus::Success => stats.successful += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Running => stats.running += 1,
            }
        }
        if stats.total_executions > 0 {
            stats.success_rate = stats.successful as f64 / stats.total_executions as f64 * 100.0;
        }
        Ok(stats)
    }
}
