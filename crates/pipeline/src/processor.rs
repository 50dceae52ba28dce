//! Top-level batch pipeline: filter → extract → cluster → gate
//! notifications and RCA.
//!
//! Tolerant by contract: per-record and per-cluster failures are counted
//! and logged, never propagated; only a missing log source aborts a batch.

use std::sync::Arc;

use async_trait::async_trait;
use model::{ExceptionCluster, LogRecord, Result};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::clusterer::Clusterer;
use crate::extractor::ExceptionExtractor;

/// Seam to the RCA engine; implemented by the `rca` crate's analyzer.
#[async_trait]
pub trait RcaEngine: Send + Sync {
    async fn should_trigger_rca(&self, cluster: &ExceptionCluster) -> bool;
    /// Run RCA and return the new artifact's id.
    async fn analyze_cluster(&self, cluster_id: &str) -> Result<String>;
}

/// Seam to the notifier; wired up by the server binary.
#[async_trait]
pub trait ClusterNotifier: Send + Sync {
    async fn notify_cluster(&self, cluster: &ExceptionCluster, batch_count: u64) -> Result<()>;
    async fn notify_rca_generated(&self, cluster: &ExceptionCluster) -> Result<()>;
}

/// Counters returned for every processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessStats {
    pub total_logs: u64,
    pub error_logs: u64,
    pub exceptions_extracted: u64,
    pub clusters_created: u64,
    pub rca_generated: u64,
    pub notifications_sent: u64,
}

/// Composes the pipeline stages over one log source's batches.
#[derive(Clone)]
pub struct Processor {
    extractor: ExceptionExtractor,
    clusterer: Clusterer,
    processing_levels: Vec<String>,
    notification_threshold: u64,
    notifier: Option<Arc<dyn ClusterNotifier>>,
    rca: Option<Arc<dyn RcaEngine>>,
}

impl Processor {
    pub fn new(clusterer: Clusterer, processing_levels: Vec<String>) -> Self {
        Self {
            extractor: ExceptionExtractor::new(),
            clusterer,
            processing_levels,
            notification_threshold: u64::MAX,
            notifier: None,
            rca: None,
        }
    }

    pub fn with_notifier(
        mut self,
        notifier: Arc<dyn ClusterNotifier>,
        threshold: u64,
    ) -> Self {
        self.notifier = Some(notifier);
        self.notification_threshold = threshold;
        self
    }

    pub fn with_rca(mut self, rca: Arc<dyn RcaEngine>) -> Self {
        self.rca = Some(rca);
        self
    }

    /// Process one batch of already-normalized records.
    pub async fn process_records(
        &self,
        records: &[LogRecord],
        log_source_id: &str,
    ) -> Result<ProcessStats> {
        let mut stats = ProcessStats {
            total_logs: records.len() as u64,
            ..Default::default()
        };
        if records.is_empty() {
            return Ok(stats);
        }

        let error_logs: Vec<&LogRecord> = records
            .iter()
            .filter(|r| r.level_in(&self.processing_levels))
            .collect();
        stats.error_logs = error_logs.len() as u64;
        info!(
            total = stats.total_logs,
            errors = stats.error_logs,
            log_source_id,
            "processing batch"
        );
        if error_logs.is_empty() {
            return Ok(stats);
        }

        let descriptors: Vec<_> = error_logs
            .iter()
            .filter_map(|record| self.extractor.extract(record))
            .collect();
        stats.exceptions_extracted = descriptors.len() as u64;
        if descriptors.is_empty() {
            return Ok(stats);
        }

        let outcomes = self
            .clusterer
            .cluster_exceptions(&descriptors, log_source_id)
            .await?;
        stats.clusters_created = outcomes.len() as u64;

        for outcome in &outcomes {
            if let Some(notifier) = &self.notifier {
                if outcome.batch_count >= self.notification_threshold {
                    match notifier.notify_cluster(&outcome.cluster, outcome.batch_count).await {
                        Ok(()) => stats.notifications_sent += 1,
                        Err(e) => warn!(
                            cluster_id = %outcome.cluster.cluster_id,
                            error = %e,
                            "cluster notification failed"
                        ),
                    }
                }
            }

            if let Some(rca) = &self.rca {
                if rca.should_trigger_rca(&outcome.cluster).await {
                    match rca.analyze_cluster(&outcome.cluster.cluster_id).await {
                        Ok(rca_id) => {
                            stats.rca_generated += 1;
                            info!(cluster_id = %outcome.cluster.cluster_id, rca_id, "RCA generated");
                            if let Some(notifier) = &self.notifier {
                                if let Err(e) = notifier.notify_rca_generated(&outcome.cluster).await
                                {
                                    warn!(error = %e, "RCA notification failed");
                                }
                            }
                        }
                        Err(e) => error!(
                            cluster_id = %outcome.cluster.cluster_id,
                            error = %e,
                            "RCA generation failed"
                        ),
                    }
                }
            }
        }

        info!(?stats, "batch complete");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::Normalizer;
    use model::{
        ConnectionStatus, Error, GitProvider, IndexingStatus, LogSource, Service, SourceType,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use store::{MemoryStore, MetaStore};

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_service(Service {
                service_id: "svc_1".into(),
                name: "checkout".into(),
                is_active: true,
                repository_url: None,
                git_branch: "main".into(),
                git_provider: None,
                git_repo_path: Some("/srv/repos/checkout".into()),
                access_token: None,
                use_api_mode: false,
                log_processing_enabled: true,
                rca_generation_enabled: true,
                code_indexing_enabled: false,
                log_fetch_duration_minutes: Some(30),
                log_fetch_duration_hours: None,
                log_fetch_duration_days: None,
                rca_generation_interval_minutes: 60,
                last_log_fetch: None,
                last_rca_generation: None,
                last_code_indexing: None,
                code_indexing_status: IndexingStatus::NotIndexed,
                last_indexed_commit: None,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        store
            .insert_log_source(LogSource {
                log_source_id: "src_1".into(),
                service_id: "svc_1".into(),
                source_type: SourceType::Opensearch,
                host: "localhost".into(),
                port: 9200,
                username: None,
                password: None,
                use_ssl: false,
                verify_certs: false,
                index_pattern: "logs-*".into(),
                query_filter: None,
                is_active: true,
                fetch_enabled: true,
                fetch_interval_minutes: 5,
                connection_status: ConnectionStatus::Unknown,
                last_fetch_at: None,
                last_error: None,
            })
            .await
            .unwrap();
        store
    }

    fn default_levels() -> Vec<String> {
        vec!["ERROR".into(), "CRITICAL".into(), "FATAL".into()]
    }

    fn records(raws: Vec<serde_json::Value>) -> Vec<LogRecord> {
        Normalizer::new().normalize_batch(&raws)
    }

    struct CountingRca {
        triggered: AtomicU64,
        fail: bool,
    }

    #[async_trait]
    impl RcaEngine for CountingRca {
        async fn should_trigger_rca(&self, _cluster: &ExceptionCluster) -> bool {
            true
        }

        async fn analyze_cluster(&self, _cluster_id: &str) -> Result<String> {
            self.triggered.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::upstream("llm", "rate limited"))
            } else {
                Ok("rca_test".into())
            }
        }
    }

    struct CountingNotifier {
        sent: AtomicU64,
    }

    #[async_trait]
    impl ClusterNotifier for CountingNotifier {
        async fn notify_cluster(&self, _c: &ExceptionCluster, _n: u64) -> Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn notify_rca_generated(&self, _c: &ExceptionCluster) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_batch_counts() {
        let store = seeded_store().await;
        let processor = Processor::new(Clusterer::new(store), default_levels());

        let stats = processor
            .process_records(
                &records(vec![
                    json!({"timestamp": "t", "level": "INFO", "message": "ok"}),
                    json!({"timestamp": "t", "level": "WARNING", "message": "hmm"}),
                    json!({
                        "timestamp": "t", "level": "ERROR",
                        "message": "NullPointerException: boom",
                        "stack_trace": ["at com.foo.Bar.baz(Bar.java:42)"]
                    }),
                    json!({
                        "timestamp": "t", "level": "ERROR",
                        "message": "NullPointerException: boom",
                        "stack_trace": ["at com.foo.Bar.baz(Bar.java:42)"]
                    }),
                ]),
                "src_1",
            )
            .await
            .unwrap();

        assert_eq!(stats.total_logs, 4);
        assert_eq!(stats.error_logs, 2);
        assert_eq!(stats.exceptions_extracted, 2);
        assert_eq!(stats.clusters_created, 1);
        assert_eq!(stats.rca_generated, 0);
        assert_eq!(stats.notifications_sent, 0);
    }

    #[tokio::test]
    async fn test_warning_excluded_by_default() {
        let store = seeded_store().await;
        let processor = Processor::new(Clusterer::new(store), default_levels());
        let stats = processor
            .process_records(
                &records(vec![json!({
                    "timestamp": "t", "level": "WARN",
                    "message": "NullPointerException: boom"
                })]),
                "src_1",
            )
            .await
            .unwrap();
        // WARN normalizes to WARNING, which is outside the processing set.
        assert_eq!(stats.error_logs, 0);
    }

    #[tokio::test]
    async fn test_rca_failure_does_not_abort_batch() {
        let store = seeded_store().await;
        let rca = Arc::new(CountingRca { triggered: AtomicU64::new(0), fail: true });
        let processor =
            Processor::new(Clusterer::new(store), default_levels()).with_rca(rca.clone());

        let stats = processor
            .process_records(
                &records(vec![json!({
                    "timestamp": "t", "level": "ERROR",
                    "message": "TimeoutError: upstream timed out",
                    "stack_trace": ["at com.foo.Client.call(Client.java:9)"]
                })]),
                "src_1",
            )
            .await
            .unwrap();

        assert_eq!(rca.triggered.load(Ordering::SeqCst), 1);
        assert_eq!(stats.rca_generated, 0);
        assert_eq!(stats.clusters_created, 1);
    }

    #[tokio::test]
    async fn test_notification_threshold_gates() {
        let store = seeded_store().await;
        let notifier = Arc::new(CountingNotifier { sent: AtomicU64::new(0) });
        let processor = Processor::new(Clusterer::new(store), default_levels())
            .with_notifier(notifier.clone(), 2);

        let one = json!({
            "timestamp": "t", "level": "ERROR",
            "message": "SocketException: network unreachable",
            "stack_trace": ["at com.foo.Net.dial(Net.java:3)"]
        });

        // A single occurrence stays below the threshold of 2.
        let stats = processor
            .process_records(&records(vec![one.clone()]), "src_1")
            .await
            .unwrap();
        assert_eq!(stats.notifications_sent, 0);

        let stats = processor
            .process_records(&records(vec![one.clone(), one]), "src_1")
            .await
            .unwrap();
        assert_eq!(stats.notifications_sent, 1);
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_log_source_propagates() {
        let store = seeded_store().await;
        let processor = Processor::new(Clusterer::new(store), default_levels());
        let err = processor
            .process_records(
                &records(vec![json!({
                    "timestamp": "t", "level": "ERROR", "message": "IOError: disk"
                })]),
                "src_missing",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_successful_rca_counted() {
        let store = seeded_store().await;
        let rca = Arc::new(CountingRca { triggered: AtomicU64::new(0), fail: false });
        let processor =
            Processor::new(Clusterer::new(store.clone()), default_levels()).with_rca(rca);

        let stats = processor
            .process_records(
                &records(vec![json!({
                    "timestamp": "t", "level": "ERROR",
                    "message": "ValueError: bad input",
                    "stack_trace": ["File \"app.py\", line 3, in run"]
                })]),
                "src_1",
            )
            .await
            .unwrap();
        assert_eq!(stats.rca_generated, 1);
    }
}
