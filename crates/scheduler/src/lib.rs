//! Per-service periodic task dispatch.
//!
//! A single timer loop evaluates every active service each tick and
//! decides whether a log fetch or an RCA sweep is due; code indexing runs
//! on demand only. Work executes on the shared tokio runtime. The
//! execution tracker's `running` row is the only lock: a task is
//! dispatched only when the claim insert succeeds.

pub mod tracker;

pub use tracker::{calculate_next_run, ExecutionTracker};

use std::sync::Arc;

use chrono::Utc;
use indexer::{backend_for_service, CodeIndexer, IndexStats, Language};
use model::{ClusterStatus, Error, Result, Service, TaskName, TaskStatus};
use pipeline::{Processor, RcaEngine};
use serde_json::json;
use sources::LogFetcher;
use store::{ClusterFilter, Embedder, MetaStore, VectorStore};
use tracing::{error, info, warn};

/// Languages indexed by default.
const INDEX_LANGUAGES: &[Language] = &[Language::Python, Language::Java];

/// Counters for one scheduler tick.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct TickStats {
    pub services_processed: u64,
    pub log_fetch_dispatched: u64,
    pub rca_dispatched: u64,
    pub errors: Vec<String>,
}

pub struct Scheduler {
    store: Arc<dyn MetaStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    tracker: ExecutionTracker,
    fetcher: LogFetcher,
    processor: Arc<Processor>,
    rca: Option<Arc<dyn RcaEngine>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn MetaStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        processor: Arc<Processor>,
        rca: Option<Arc<dyn RcaEngine>>,
    ) -> Self {
        Self {
            tracker: ExecutionTracker::new(store.clone()),
            fetcher: LogFetcher::new(store.clone()),
            store,
            vectors,
            embedder,
            processor,
            rca,
        }
    }

    pub fn tracker(&self) -> &ExecutionTracker {
        &self.tracker
    }

    /// Run the timer loop until the process exits. One tick enqueues; the
    /// work itself runs on spawned tasks.
    pub async fn run(self: Arc<Self>, tick: std::time::Duration) {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(tick_secs = tick.as_secs(), "scheduler started");
        loop {
            interval.tick().await;
            let stats = self.schedule_service_tasks().await;
            if !stats.errors.is_empty() {
                warn!(errors = stats.errors.len(), "scheduler tick had errors");
            }
        }
    }

    /// One tick: evaluate every active service and dispatch what is due.
    /// Per-service failures are recorded and do not block other services.
    pub async fn schedule_service_tasks(self: &Arc<Self>) -> TickStats {
        let mut stats = TickStats::default();

        let services = match self.store.list_services(true).await {
            Ok(services) => services,
            Err(e) => {
                error!(error = %e, "could not list services");
                stats.errors.push(e.to_string());
                return stats;
            }
        };

        for service in services {
            stats.services_processed += 1;
            for task in self.due_tasks(&service).await {
                match self.dispatch(&service, task).await {
                    Ok(true) => match task {
                        TaskName::LogFetch => stats.log_fetch_dispatched += 1,
                        TaskName::RcaGeneration => stats.rca_dispatched += 1,
                        TaskName::CodeIndexing => {}
                    },
                    Ok(false) => {}
                    Err(e) => {
                        error!(service_id = %service.service_id, task = %task, error = %e, "dispatch failed");
                        stats.errors.push(format!("{}/{task}: {e}", service.service_id));
                    }
                }
            }
        }

        stats
    }

    /// Which tasks are due for a service right now. Code indexing never
    /// appears here; it is on-demand only.
    pub async fn due_tasks(&self, service: &Service) -> Vec<TaskName> {
        let mut due = Vec::new();
        if !service.is_active {
            return due;
        }

        if service.log_processing_enabled && self.log_fetch_due(service).await {
            due.push(TaskName::LogFetch);
        }

        if service.rca_generation_enabled && rca_due(service) {
            due.push(TaskName::RcaGeneration);
        }

        due
    }

    async fn log_fetch_due(&self, service: &Service) -> bool {
        let sources = match self.store.list_log_sources(&service.service_id, true).await {
            Ok(sources) => sources,
            Err(_) => return false,
        };
        if sources.is_empty() {
            return false;
        }
        match service.last_log_fetch {
            None => true,
            Some(last) => Utc::now() - last >= service.log_fetch_duration(),
        }
    }

    /// Claim the single-flight slot and spawn the worker. Returns whether
    /// the task was actually dispatched.
    pub async fn dispatch(self: &Arc<Self>, service: &Service, task: TaskName) -> Result<bool> {
        let Some(execution_id) = self.tracker.start(&service.service_id, task).await? else {
            return Ok(false);
        };

        let scheduler = Arc::clone(self);
        let service = service.clone();
        tokio::spawn(async move {
            scheduler.execute(service, task, execution_id).await;
        });
        Ok(true)
    }

    /// Run one claimed task to completion and close its execution row.
    async fn execute(&self, service: Service, task: TaskName, execution_id: u64) {
        let outcome = match task {
            TaskName::LogFetch => self.run_log_fetch(&service).await,
            TaskName::RcaGeneration => self.run_rca_generation(&service).await,
            TaskName::CodeIndexing => self
                .run_code_indexing(&service, false)
                .await
                .map(|stats| json!(stats)),
        };

        let completion = match outcome {
            Ok(stats) => {
                self.tracker
                    .complete(
                        execution_id,
                        &service.service_id,
                        task,
                        TaskStatus::Success,
                        Some(stats),
                        None,
                    )
                    .await
            }
            Err(e) => {
                self.tracker
                    .complete(
                        execution_id,
                        &service.service_id,
                        task,
                        TaskStatus::Failed,
                        None,
                        Some(e.to_string()),
                    )
                    .await
            }
        };
        if let Err(e) = completion {
            error!(service_id = %service.service_id, task = %task, error = %e, "could not close execution row");
        }
    }

    /// Fetch and process every fetchable source of a service. Per-source
    /// failures are counted, not propagated.
    pub async fn run_log_fetch(&self, service: &Service) -> Result<serde_json::Value> {
        let sources = self.store.list_log_sources(&service.service_id, true).await?;
        let lookback = service.log_fetch_duration();

        let mut processed = pipeline::ProcessStats::default();
        let mut sources_ok = 0u64;
        let mut sources_failed = 0u64;

        for source in &sources {
            match self.fetcher.fetch_source(&source.log_source_id, lookback).await {
                Ok(records) => {
                    match self
                        .processor
                        .process_records(&records, &source.log_source_id)
                        .await
                    {
                        Ok(stats) => {
                            sources_ok += 1;
                            processed.total_logs += stats.total_logs;
                            processed.error_logs += stats.error_logs;
                            processed.exceptions_extracted += stats.exceptions_extracted;
                            processed.clusters_created += stats.clusters_created;
                            processed.rca_generated += stats.rca_generated;
                            processed.notifications_sent += stats.notifications_sent;
                        }
                        Err(e) => {
                            warn!(log_source_id = %source.log_source_id, error = %e, "processing failed");
                            sources_failed += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(log_source_id = %source.log_source_id, error = %e, "fetch failed");
                    sources_failed += 1;
                }
            }
        }

        Ok(json!({
            "sources_ok": sources_ok,
            "sources_failed": sources_failed,
            "processing": processed,
        }))
    }

    /// Sweep the service's active clusters and analyze the ones that
    /// qualify. Per-cluster failures are counted, not propagated.
    pub async fn run_rca_generation(&self, service: &Service) -> Result<serde_json::Value> {
        let Some(rca) = &self.rca else {
            return Ok(json!({ "analyzed": 0, "skipped": "llm analysis disabled" }));
        };

        let clusters = self
            .store
            .list_clusters(&ClusterFilter {
                status: Some(ClusterStatus::Active),
                service_id: Some(service.service_id.clone()),
                ..Default::default()
            })
            .await?;

        let mut analyzed = 0u64;
        let mut failed = 0u64;
        for cluster in &clusters {
            if !rca.should_trigger_rca(cluster).await {
                continue;
            }
            match rca.analyze_cluster(&cluster.cluster_id).await {
                Ok(rca_id) => {
                    info!(cluster_id = %cluster.cluster_id, rca_id, "RCA generated");
                    analyzed += 1;
                }
                Err(e) => {
                    warn!(cluster_id = %cluster.cluster_id, error = %e, "RCA failed");
                    failed += 1;
                }
            }
        }

        Ok(json!({ "clusters_seen": clusters.len(), "analyzed": analyzed, "failed": failed }))
    }

    async fn run_code_indexing(&self, service: &Service, force_full: bool) -> Result<IndexStats> {
        let backend = backend_for_service(service)?;
        let indexer = CodeIndexer::new(
            backend,
            self.store.clone(),
            self.vectors.clone(),
            self.embedder.clone(),
            &service.service_id,
        );
        indexer.index_repository(INDEX_LANGUAGES, force_full).await
    }

    /// On-demand indexing entry point (manual API, pre-RCA policy).
    /// Claims the single-flight slot synchronously so callers can report
    /// an already-running conflict, then runs to completion.
    pub async fn trigger_code_indexing(
        &self,
        service_id: &str,
        force_full: bool,
    ) -> Result<IndexStats> {
        let service = self.store.get_service(service_id).await?;
        let Some(execution_id) = self.tracker.start(service_id, TaskName::CodeIndexing).await?
        else {
            return Err(Error::Conflict(format!(
                "code indexing already running for service {service_id}"
            )));
        };

        let result = self.run_code_indexing(&service, force_full).await;
        match &result {
            Ok(stats) => {
                self.tracker
                    .complete(
                        execution_id,
                        service_id,
                        TaskName::CodeIndexing,
                        TaskStatus::Success,
                        Some(json!(stats)),
                        None,
                    )
                    .await?;
            }
            Err(e) => {
                self.tracker
                    .complete(
                        execution_id,
                        service_id,
                        TaskName::CodeIndexing,
                        TaskStatus::Failed,
                        None,
                        Some(e.to_string()),
                    )
                    .await?;
            }
        }
        result
    }
}

fn rca_due(service: &Service) -> bool {
    match service.last_rca_generation {
        None => true,
        Some(last) => {
            Utc::now() - last
                >= chrono::Duration::minutes(service.rca_generation_interval_minutes as i64)
        }
    }
}
