//! Bridges the processor's notification seam to the webhook notifier.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use model::{ClusterSeverity, Error, ExceptionCluster, Result};
use notify::{NotifyEvent, Notifier, Severity};
use pipeline::ClusterNotifier;
use store::MetaStore;

pub struct WebhookClusterNotifier {
    notifier: Notifier,
    store: Arc<dyn MetaStore>,
}

impl WebhookClusterNotifier {
    pub fn new(notifier: Notifier, store: Arc<dyn MetaStore>) -> Self {
        Self { notifier, store }
    }

    async fn service_name(&self, service_id: &str) -> String {
        match self.store.get_service(service_id).await {
            Ok(service) => service.name,
            Err(_) => service_id.to_string(),
        }
    }

    async fn deliver(&self, event: NotifyEvent) -> Result<()> {
        let results = self.notifier.notify_and_wait(event).await;
        if results.is_empty() {
            return Err(Error::upstream("webhook", "no notification channels configured"));
        }
        if results.iter().any(|(_, result)| result.is_ok()) {
            return Ok(());
        }
        let failures: Vec<String> = results
            .iter()
            .filter_map(|(name, result)| {
                result.as_ref().err().map(|e| format!("{name}: {e}"))
            })
            .collect();
        Err(Error::upstream("webhook", failures.join("; ")))
    }
}

fn severity_for(cluster: &ExceptionCluster) -> Severity {
    match cluster.severity() {
        ClusterSeverity::Low => Severity::Info,
        ClusterSeverity::Medium | ClusterSeverity::High => Severity::Warning,
        ClusterSeverity::Critical => Severity::Critical,
    }
}

#[async_trait]
impl ClusterNotifier for WebhookClusterNotifier {
    async fn notify_cluster(&self, cluster: &ExceptionCluster, batch_count: u64) -> Result<()> {
        let event = NotifyEvent::ExceptionCluster {
            cluster_id: cluster.cluster_id.clone(),
            service_name: self.service_name(&cluster.service_id).await,
            exception_type: cluster.exception_type.clone(),
            exception_message: cluster.exception_message.clone(),
            occurrences: batch_count,
            severity: severity_for(cluster),
            timestamp: Utc::now(),
        };
        self.deliver(event).await
    }

    async fn notify_rca_generated(&self, cluster: &ExceptionCluster) -> Result<()> {
        let (file, symbol, confidence) = match self.store.latest_rca(&cluster.cluster_id).await? {
            Some(rca) => (rca.root_cause_file, rca.root_cause_symbol, rca.confidence_score),
            None => (String::new(), String::new(), 0.0),
        };
        let event = NotifyEvent::RcaGenerated {
            cluster_id: cluster.cluster_id.clone(),
            service_name: self.service_name(&cluster.service_id).await,
            root_cause_file: file,
            root_cause_symbol: symbol,
            confidence,
            timestamp: Utc::now(),
        };
        self.deliver(event).await
    }
}
