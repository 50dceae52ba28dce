//! Cluster listing, detail, and lifecycle endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use model::{ClusterSeverity, ClusterStatus, Error, ExceptionCluster, StackFrame, TimeFilter};
use serde::{Deserialize, Serialize};
use store::ClusterFilter;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// `active` (default), `skipped`, `resolved`, or `all`.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub log_source_id: Option<String>,
    #[serde(default)]
    pub time_filter: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClusterView {
    pub cluster_id: String,
    pub service_id: String,
    pub log_source_id: String,
    pub exception_type: String,
    pub exception_message: String,
    pub signature: String,
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub frequency_24h: u64,
    pub severity: ClusterSeverity,
    pub status: ClusterStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_updated_by: Option<String>,
    pub logger_path: String,
    pub has_rca: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<String>,
    pub stack_trace: Vec<StackFrame>,
}

impl From<ExceptionCluster> for ClusterView {
    fn from(cluster: ExceptionCluster) -> Self {
        Self {
            severity: cluster.severity(),
            cluster_id: cluster.cluster_id,
            service_id: cluster.service_id,
            log_source_id: cluster.log_source_id,
            exception_type: cluster.exception_type,
            exception_message: cluster.exception_message,
            signature: cluster.fingerprint_static,
            count: cluster.cluster_size,
            first_seen: cluster.first_seen,
            last_seen: cluster.last_seen,
            frequency_24h: cluster.frequency_24h,
            status: cluster.status,
            status_updated_at: cluster.status_updated_at,
            status_updated_by: cluster.status_updated_by,
            logger_path: cluster.logger_path,
            has_rca: cluster.has_rca,
            error_category: cluster.error_category,
            stack_trace: cluster.stack_trace,
        }
    }
}

/// Translate the query into a store filter. An unknown `time_filter` is
/// ignored; an unknown `status` is a validation error.
pub fn build_filter(query: &ListQuery) -> Result<ClusterFilter, Error> {
    let status = match query.status.as_deref() {
        None => Some(ClusterStatus::Active),
        Some("all") => None,
        Some(other) => Some(ClusterStatus::parse(other)?),
    };
    Ok(ClusterFilter {
        status,
        service_id: query.service_id.clone(),
        log_source_id: query.log_source_id.clone(),
        time_filter: query.time_filter.as_deref().and_then(TimeFilter::parse),
    })
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ClusterView>>, ApiError> {
    let filter = build_filter(&query)?;
    let clusters = state.store.list_clusters(&filter).await?;
    Ok(Json(clusters.into_iter().map(ClusterView::from).collect()))
}

pub async fn detail(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
) -> Result<Json<ClusterView>, ApiError> {
    let cluster = state.store.get_cluster(&cluster_id).await?;
    Ok(Json(cluster.into()))
}

#[derive(Debug, Deserialize)]
pub struct TransitionQuery {
    #[serde(default)]
    pub updated_by: Option<String>,
}

pub async fn skip(
    state: State<AppState>,
    path: Path<String>,
    query: Query<TransitionQuery>,
) -> Result<Json<ClusterView>, ApiError> {
    transition(state, path, query, ClusterStatus::Skipped).await
}

pub async fn resolve(
    state: State<AppState>,
    path: Path<String>,
    query: Query<TransitionQuery>,
) -> Result<Json<ClusterView>, ApiError> {
    transition(state, path, query, ClusterStatus::Resolved).await
}

pub async fn reactivate(
    state: State<AppState>,
    path: Path<String>,
    query: Query<TransitionQuery>,
) -> Result<Json<ClusterView>, ApiError> {
    transition(state, path, query, ClusterStatus::Active).await
}

async fn transition(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
    Query(query): Query<TransitionQuery>,
    to: ClusterStatus,
) -> Result<Json<ClusterView>, ApiError> {
    let updated_by = query.updated_by.as_deref().unwrap_or("user");
    let cluster = state
        .clusterer
        .update_status(&cluster_id, to, updated_by)
        .await?;
    Ok(Json(cluster.into()))
}
