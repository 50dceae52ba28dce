//! Service listing and scheduler status views.

use axum::extract::{Path, State};
use axum::Json;
use model::TaskName;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let services = state.store.list_services(false).await?;
    let body: Vec<Value> = services
        .iter()
        .map(|s| {
            json!({
                "service_id": s.service_id,
                "name": s.name,
                "is_active": s.is_active,
                "log_processing_enabled": s.log_processing_enabled,
                "rca_generation_enabled": s.rca_generation_enabled,
                "code_indexing_enabled": s.code_indexing_enabled,
                "code_indexing_status": s.code_indexing_status,
                "last_log_fetch": s.last_log_fetch,
                "last_rca_generation": s.last_rca_generation,
                "last_code_indexing": s.last_code_indexing,
            })
        })
        .collect();
    Ok(Json(json!({ "services": body })))
}

pub async fn status(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let service = state.store.get_service(&service_id).await?;
    let sources = state.store.list_log_sources(&service_id, false).await?;
    let fetchable = sources.iter().filter(|s| s.is_active && s.fetch_enabled).count();

    let tracker = state.scheduler.tracker();
    let mut task_stats = serde_json::Map::new();
    for task in [TaskName::LogFetch, TaskName::RcaGeneration, TaskName::CodeIndexing] {
        task_stats.insert(task.to_string(), json!(tracker.stats(&service_id, task, 24).await?));
    }

    Ok(Json(json!({
        "service_id": service.service_id,
        "service_name": service.name,
        "is_active": service.is_active,
        "last_log_fetch": service.last_log_fetch,
        "last_rca_generation": service.last_rca_generation,
        "last_code_indexing": service.last_code_indexing,
        "code_indexing_status": service.code_indexing_status,
        "last_indexed_commit": service.last_indexed_commit,
        "log_sources_count": sources.len(),
        "active_log_sources": fetchable,
        "task_stats_24h": task_stats,
        "configuration": {
            "rca_generation_enabled": service.rca_generation_enabled,
            "rca_generation_interval_minutes": service.rca_generation_interval_minutes,
            "code_indexing_enabled": service.code_indexing_enabled,
            "git_branch": service.git_branch,
            "repository_url": service.repository_url,
            "use_api_mode": service.use_api_mode,
        },
    })))
}
