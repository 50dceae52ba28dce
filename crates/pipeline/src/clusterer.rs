//! Mapping fingerprinted exceptions onto cluster records.
//!
//! Descriptors with stack traces group by their frame fingerprint;
//! descriptors without group by their template fingerprint. Each group is
//! folded into the store with one atomic get-or-create per key, under
//! strict tenant isolation: the owning service is always resolved from the
//! log source, never trusted from the caller.

use std::collections::HashMap;
use std::sync::Arc;

use model::{ClusterStatus, Error, ExceptionCluster, NewCluster, Result};
use store::MetaStore;
use tracing::{debug, info};

use crate::extractor::ExceptionDescriptor;

/// One cluster touched by a batch.
#[derive(Debug, Clone)]
pub struct ClusterOutcome {
    pub cluster: ExceptionCluster,
    /// Whether this batch created the cluster.
    pub created: bool,
    /// How many exceptions of this batch landed in the cluster.
    pub batch_count: u64,
}

/// Groups descriptors and upserts clusters.
#[derive(Clone)]
pub struct Clusterer {
    store: Arc<dyn MetaStore>,
}

impl Clusterer {
    pub fn new(store: Arc<dyn MetaStore>) -> Self {
        Self { store }
    }

    /// Cluster a batch of descriptors for one log source.
    ///
    /// Records inside the batch keep their arrival order within each
    /// group, so the first descriptor of a group is the stable
    /// representative.
    pub async fn cluster_exceptions(
        &self,
        descriptors: &[ExceptionDescriptor],
        log_source_id: &str,
    ) -> Result<Vec<ClusterOutcome>> {
        if log_source_id.is_empty() {
            return Err(Error::Validation(
                "log_source_id is required for clustering".into(),
            ));
        }
        let log_source = self.store.get_log_source(log_source_id).await?;
        let service_id = log_source.service_id;

        let with_stack: Vec<&ExceptionDescriptor> =
            descriptors.iter().filter(|d| d.has_stack_trace).collect();
        let without_stack: Vec<&ExceptionDescriptor> =
            descriptors.iter().filter(|d| !d.has_stack_trace).collect();
        info!(
            with_stack = with_stack.len(),
            without_stack = without_stack.len(),
            log_source_id,
            "clustering batch"
        );

        let mut outcomes = Vec::new();
        let now = chrono::Utc::now();

        for (fingerprint, group) in group_by_fingerprint(&with_stack) {
            let new = new_cluster(&service_id, log_source_id, &fingerprint, &group);
            let upsert = self.store.upsert_cluster(new, group.len() as u64, now).await?;
            debug!(cluster_id = %upsert.cluster.cluster_id, created = upsert.created, "stack-trace group");
            outcomes.push(ClusterOutcome {
                cluster: upsert.cluster,
                created: upsert.created,
                batch_count: group.len() as u64,
            });
        }

        for (fingerprint, group) in group_by_fingerprint(&without_stack) {
            let new = new_cluster(&service_id, log_source_id, &fingerprint, &group);
            let upsert = self.store.upsert_cluster(new, group.len() as u64, now).await?;
            debug!(cluster_id = %upsert.cluster.cluster_id, created = upsert.created, "template group");
            outcomes.push(ClusterOutcome {
                cluster: upsert.cluster,
                created: upsert.created,
                batch_count: group.len() as u64,
            });
        }

        info!(clusters = outcomes.len(), total = descriptors.len(), "clustered batch");
        Ok(outcomes)
    }

    /// Single validated setter behind the lifecycle endpoints.
    pub async fn update_status(
        &self,
        cluster_id: &str,
        status: ClusterStatus,
        updated_by: &str,
    ) -> Result<ExceptionCluster> {
        let cluster = self
            .store
            .update_cluster_status(cluster_id, status, updated_by)
            .await?;
        info!(cluster_id, status = %status, updated_by, "cluster status updated");
        Ok(cluster)
    }

    pub async fn skip_cluster(&self, cluster_id: &str, updated_by: &str) -> Result<ExceptionCluster> {
        self.update_status(cluster_id, ClusterStatus::Skipped, updated_by).await
    }

    pub async fn resolve_cluster(
        &self,
        cluster_id: &str,
        updated_by: &str,
    ) -> Result<ExceptionCluster> {
        self.update_status(cluster_id, ClusterStatus::Resolved, updated_by).await
    }

    /// The only path back to `active` from `skipped` or `resolved`.
    pub async fn reactivate_cluster(
        &self,
        cluster_id: &str,
        updated_by: &str,
    ) -> Result<ExceptionCluster> {
        self.update_status(cluster_id, ClusterStatus::Active, updated_by).await
    }
}

/// Group descriptors by primary fingerprint, preserving first-arrival
/// order of both groups and members.
fn group_by_fingerprint<'a>(
    descriptors: &[&'a ExceptionDescriptor],
) -> Vec<(String, Vec<&'a ExceptionDescriptor>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&ExceptionDescriptor>> = HashMap::new();
    for descriptor in descriptors {
        let key = descriptor.fingerprint_static.clone();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(descriptor);
    }
    order
        .into_iter()
        .map(|key| {
            let group = groups.remove(&key).unwrap_or_default();
            (key, group)
        })
        .collect()
}

fn new_cluster(
    service_id: &str,
    log_source_id: &str,
    fingerprint: &str,
    group: &[&ExceptionDescriptor],
) -> NewCluster {
    let representative = group[0];
    NewCluster {
        service_id: service_id.to_string(),
        log_source_id: log_source_id.to_string(),
        fingerprint_static: fingerprint.to_string(),
        exception_type: representative.exception_type.clone(),
        exception_message: representative.exception_message.clone(),
        fingerprint_semantic: representative.fingerprints.as_ref().map(|f| f.semantic.clone()),
        fingerprint_category: representative.fingerprints.as_ref().map(|f| f.category.clone()),
        error_category: representative.error_category.clone(),
        key_terms: representative.key_terms.clone(),
        representative_log_id: Some(representative.log_id.clone()),
        stack_trace: representative.stack_frames.clone(),
        logger_path: representative.logger.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::ExceptionExtractor;
    use crate::normalizer::Normalizer;
    use model::{ConnectionStatus, GitProvider, IndexingStatus, LogSource, Service, SourceType};
    use serde_json::json;
    use store::MemoryStore;

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_service(Service {
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

    fn descriptors_from(raws: Vec<serde_json::Value>) -> Vec<ExceptionDescriptor> {
        let normalizer = Normalizer::new();
        let extractor = ExceptionExtractor::new();
        normalizer
            .normalize_batch(&raws)
            .iter()
            .filter_map(|record| extractor.extract(record))
            .collect()
    }

    #[tokio::test]
    async fn test_same_stack_top_forms_one_cluster() {
        let store = seeded_store().await;
        let clusterer = Clusterer::new(store.clone());

        let descriptors = descriptors_from(vec![
            json!({
                "timestamp": "2024-01-15T10:30:00Z", "level": "ERROR",
                "message": "NullPointerException: cart was null",
                "logger": "com.foo.Bar", "thread": "w1",
                "stack_trace": ["at com.foo.Bar.baz(Bar.java:42)"]
            }),
            json!({
                "timestamp": "2024-01-15T10:31:00Z", "level": "ERROR",
                "message": "NullPointerException: cart was null again",
                "logger": "com.foo.Bar", "thread": "w2",
                "stack_trace": ["at com.foo.Bar.baz(Bar.java:42)"]
            }),
        ]);
        assert_eq!(descriptors.len(), 2);

        let outcomes = clusterer.cluster_exceptions(&descriptors, "src_1").await.unwrap();
        assert_eq!(outcomes.len(), 1);
        let outcome = &outcomes[0];
        assert!(outcome.created);
        assert_eq!(outcome.batch_count, 2);
        assert_eq!(outcome.cluster.cluster_size, 2);
        assert_eq!(outcome.cluster.frequency_24h, 2);
        assert!(!outcome.cluster.has_rca);
        assert_eq!(outcome.cluster.exception_type, "NullPointerException");
        assert_eq!(outcome.cluster.stack_trace[0].file, "Bar.java");
    }

    #[tokio::test]
    async fn test_template_cluster_without_stack() {
        let store = seeded_store().await;
        let clusterer = Clusterer::new(store.clone());

        let descriptors = descriptors_from(vec![
            json!({
                "timestamp": "2024-01-15T10:30:00Z", "level": "ERROR",
                "message": "User 12345 failed authentication at 2024-01-15T10:30:00Z",
                "logger": "auth.service", "thread": "w1"
            }),
            json!({
                "timestamp": "2024-02-02T11:00:00Z", "level": "ERROR",
                "message": "User 67890 failed authentication at 2024-02-02T11:00:00Z",
                "logger": "auth.service", "thread": "w2"
            }),
        ]);
        assert_eq!(descriptors.len(), 2);

        let outcomes = clusterer.cluster_exceptions(&descriptors, "src_1").await.unwrap();
        assert_eq!(outcomes.len(), 1);
        let cluster = &outcomes[0].cluster;
        assert_eq!(cluster.cluster_size, 2);
        assert_eq!(cluster.error_category.as_deref(), Some("AUTH_ERROR"));
        assert!(cluster.fingerprint_semantic.is_some());
        assert!(cluster.fingerprint_category.is_some());
    }

    #[tokio::test]
    async fn test_second_batch_updates_not_duplicates() {
        let store = seeded_store().await;
        let clusterer = Clusterer::new(store.clone());

        let batch = || {
            descriptors_from(vec![json!({
                "timestamp": "2024-01-15T10:30:00Z", "level": "ERROR",
                "message": "NullPointerException: boom",
                "logger": "com.foo.Bar", "thread": "w1",
                "stack_trace": ["at com.foo.Bar.baz(Bar.java:42)"]
            })])
        };

        let first = clusterer.cluster_exceptions(&batch(), "src_1").await.unwrap();
        let second = clusterer.cluster_exceptions(&batch(), "src_1").await.unwrap();
        assert!(first[0].created);
        assert!(!second[0].created);
        assert_eq!(first[0].cluster.cluster_id, second[0].cluster.cluster_id);
        assert_eq!(second[0].cluster.cluster_size, 2);

        let all = store.list_clusters(&store::ClusterFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_log_source_rejected() {
        let store = seeded_store().await;
        let clusterer = Clusterer::new(store);
        let err = clusterer.cluster_exceptions(&[], "src_missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_lifecycle_walk() {
        let store = seeded_store().await;
        let clusterer = Clusterer::new(store.clone());
        let descriptors = descriptors_from(vec![json!({
            "timestamp": "t", "level": "ERROR", "message": "UnknownHostException: no db",
            "logger": "l", "thread": "t",
            "stack_trace": ["at com.foo.Db.connect(Db.java:7)"]
        })]);
        let outcomes = clusterer.cluster_exceptions(&descriptors, "src_1").await.unwrap();
        let id = outcomes[0].cluster.cluster_id.clone();

        let c = clusterer.skip_cluster(&id, "alice").await.unwrap();
        assert_eq!(c.status, ClusterStatus::Skipped);
        assert_eq!(c.status_updated_by.as_deref(), Some("alice"));

        let c = clusterer.reactivate_cluster(&id, "alice").await.unwrap();
        assert_eq!(c.status, ClusterStatus::Active);

        let c = clusterer.resolve_cluster(&id, "bob").await.unwrap();
        assert_eq!(c.status, ClusterStatus::Resolved);
        let first_resolved_at = c.status_updated_at.unwrap();

        // Resolving again is an idempotent success with a fresh timestamp.
        let c = clusterer.resolve_cluster(&id, "bob").await.unwrap();
        assert_eq!(c.status, ClusterStatus::Resolved);
        assert!(c.status_updated_at.unwrap() >= first_resolved_at);
    }
}
