//! Durable task-run records.
//!
//! The tracker wraps the store's execution table: the `running` row is the
//! single-flight lock, completion closes it and stamps the owning
//! service's matching `last_*` field.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use model::{Result, TaskName, TaskStatus};
use serde_json::Value;
use store::{MetaStore, TaskStats};
use tracing::{info, warn};

#[derive(Clone)]
pub struct ExecutionTracker {
    store: Arc<dyn MetaStore>,
}

impl ExecutionTracker {
    pub fn new(store: Arc<dyn MetaStore>) -> Self {
        Self { store }
    }

    /// Claim the single-flight slot. `None` means a run is already active.
    pub async fn start(&self, service_id: &str, task: TaskName) -> Result<Option<u64>> {
        let claimed = self.store.claim_task(service_id, task, Utc::now()).await?;
        match claimed {
            Some(execution_id) => {
                info!(service_id, task = %task, execution_id, "task execution started");
                Ok(Some(execution_id))
            }
            None => {
                warn!(service_id, task = %task, "task already running, skipping");
                Ok(None)
            }
        }
    }

    /// Close a run. Success also advances the service's `last_*` marker.
    pub async fn complete(
        &self,
        execution_id: u64,
        service_id: &str,
        task: TaskName,
        status: TaskStatus,
        stats: Option<Value>,
        error_message: Option<String>,
    ) -> Result<()> {
        let now = Utc::now();
        self.store
            .complete_task(execution_id, status, stats, error_message, now)
            .await?;
        if status == TaskStatus::Success {
            self.store.touch_service_last_run(service_id, task, now).await?;
        }
        info!(service_id, task = %task, execution_id, status = ?status, "task execution completed");
        Ok(())
    }

    /// Close a run as failed with a cancellation note, releasing the claim.
    pub async fn cancel(
        &self,
        execution_id: u64,
        service_id: &str,
        task: TaskName,
        reason: &str,
    ) -> Result<()> {
        self.complete(
            execution_id,
            service_id,
            task,
            TaskStatus::Failed,
            None,
            Some(format!("cancelled: {reason}")),
        )
        .await
    }

    pub async fn last_successful(
        &self,
        service_id: &str,
        task: TaskName,
    ) -> Result<Option<DateTime<Utc>>> {
        self.store.last_successful_execution(service_id, task).await
    }

    pub async fn stats(
        &self,
        service_id: &str,
        task: TaskName,
        hours: i64,
    ) -> Result<TaskStats> {
        self.store
            .task_stats(service_id, task, Utc::now() - Duration::hours(hours))
            .await
    }
}

/// Next scheduled run from either an interval or a cron expression.
///
/// Interval form: `last + interval`, or now when there is no last run.
/// Cron form: the next cron step strictly after `last` (or now).
pub fn calculate_next_run(
    last_run: Option<DateTime<Utc>>,
    interval_minutes: Option<u64>,
    cron_expr: Option<&str>,
) -> Option<DateTime<Utc>> {
    if let Some(expr) = cron_expr {
        let base = last_run.unwrap_or_else(Utc::now);
        return match expr.parse::<croner::Cron>() {
            Ok(cron) => cron.find_next_occurrence(&base, false).ok(),
            Err(e) => {
                warn!(expr, error = %e, "invalid cron expression");
                None
            }
        };
    }

    interval_minutes.map(|minutes| {
        last_run.unwrap_or_else(Utc::now) + Duration::minutes(minutes as i64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{GitProvider, IndexingStatus, Service};
    use store::MemoryStore;

    async fn store_with_service() -> Arc<MemoryStore> {
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
                access_token: Some("t".into()),
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
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_start_complete_touches_service() {
        let store = store_with_service().await;
        let tracker = ExecutionTracker::new(store.clone());

        let id = tracker.start("svc_1", TaskName::LogFetch).await.unwrap().unwrap();
        assert!(tracker.start("svc_1", TaskName::LogFetch).await.unwrap().is_none());

        tracker
            .complete(id, "svc_1", TaskName::LogFetch, TaskStatus::Success, None, None)
            .await
            .unwrap();

        let service = store.get_service("svc_1").await.unwrap();
        assert!(service.last_log_fetch.is_some());
        assert!(tracker.last_successful("svc_1", TaskName::LogFetch).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_run_does_not_touch_service() {
        let store = store_with_service().await;
        let tracker = ExecutionTracker::new(store.clone());

        let id = tracker.start("svc_1", TaskName::RcaGeneration).await.unwrap().unwrap();
        tracker
            .complete(
                id,
                "svc_1",
                TaskName::RcaGeneration,
                TaskStatus::Failed,
                None,
                Some("llm down".into()),
            )
            .await
            .unwrap();

        let service = store.get_service("svc_1").await.unwrap();
        assert!(service.last_rca_generation.is_none());
        assert!(tracker
            .last_successful("svc_1", TaskName::RcaGeneration)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_cancel_releases_claim() {
        let store = store_with_service().await;
        let tracker = ExecutionTracker::new(store.clone());

        let id = tracker.start("svc_1", TaskName::CodeIndexing).await.unwrap().unwrap();
        tracker.cancel(id, "svc_1", TaskName::CodeIndexing, "shutdown").await.unwrap();

        // The slot is free again.
        assert!(tracker.start("svc_1", TaskName::CodeIndexing).await.unwrap().is_some());

        let executions = store
            .list_task_executions("svc_1", Some(TaskName::CodeIndexing), 10)
            .await
            .unwrap();
        assert!(executions
            .iter()
            .any(|e| e.error_message.as_deref() == Some("cancelled: shutdown")));
    }

    #[tokio::test]
    async fn test_stats_over_window() {
        let store = store_with_service().await;
        let tracker = ExecutionTracker::new(store.clone());

        for outcome in [TaskStatus::Success, TaskStatus::Failed, TaskStatus::Success] {
            let id = tracker.start("svc_1", TaskName::LogFetch).await.unwrap().unwrap();
            tracker
                .complete(id, "svc_1", TaskName::LogFetch, outcome, None, None)
                .await
                .unwrap();
        }

        let stats = tracker.stats("svc_1", TaskName::LogFetch, 24).await.unwrap();
        assert_eq!(stats.total_executions, 3);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 1);
        assert!((stats.success_rate - 66.66).abs() < 1.0);
    }

    #[test]
    fn test_next_run_interval() {
        let last = Utc::now() - Duration::minutes(10);
        let next = calculate_next_run(Some(last), Some(30), None).unwrap();
        assert_eq!(next, last + Duration::minutes(30));

        // No last run: due now-ish.
        let next = calculate_next_run(None, Some(30), None).unwrap();
        assert!(next >= Utc::now() + Duration::minutes(29));
    }

    #[test]
    fn test_next_run_cron() {
        let last = "2024-01-15T10:30:00Z".parse::<DateTime<Utc>>().unwrap();
        let next = calculate_next_run(Some(last), None, Some("0 * * * *")).unwrap();
        assert_eq!(next, "2024-01-15T11:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[test]
    fn test_next_run_bad_cron() {
        assert!(calculate_next_run(None, None, Some("not a cron")).is_none());
        assert!(calculate_next_run(None, None, None).is_none());
    }
}
