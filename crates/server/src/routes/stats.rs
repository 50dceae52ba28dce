//! Read-only aggregates for the dashboard.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DurationRound, Utc};
use model::{ClusterSeverity, ClusterStatus, TimeFilter};
use serde::Deserialize;
use serde_json::{json, Value};
use store::ClusterFilter;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub time_filter: Option<String>,
}

fn filter_from(query: &StatsQuery, status: Option<ClusterStatus>) -> ClusterFilter {
    ClusterFilter {
        status,
        service_id: query.service_id.clone(),
        log_source_id: None,
        time_filter: query.time_filter.as_deref().and_then(TimeFilter::parse),
    }
}

/// Headline numbers: active clusters, total exceptions, RCA coverage.
pub async fn overview(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, ApiError> {
    let active = state
        .store
        .list_clusters(&filter_from(&query, Some(ClusterStatus::Active)))
        .await?;
    let all = state.store.list_clusters(&filter_from(&query, None)).await?;

    let total_exceptions: u64 = all.iter().map(|c| c.cluster_size).sum();
    let with_rca = all.iter().filter(|c| c.has_rca).count();
    let resolved = all.iter().filter(|c| c.status == ClusterStatus::Resolved).count();

    Ok(Json(json!({
        "active_clusters": active.len(),
        "total_clusters": all.len(),
        "total_exceptions": total_exceptions,
        "clusters_with_rca": with_rca,
        "resolved_clusters": resolved,
    })))
}

/// Hourly buckets of cluster activity by `last_seen`.
pub async fn trends(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, ApiError> {
    let clusters = state.store.list_clusters(&filter_from(&query, None)).await?;

    let mut buckets: HashMap<String, (u64, u64)> = HashMap::new();
    for cluster in &clusters {
        let hour = cluster
            .last_seen
            .duration_trunc(chrono::Duration::hours(1))
            .unwrap_or(cluster.last_seen);
        let entry = buckets.entry(hour.to_rfc3339()).or_default();
        entry.0 += 1;
        entry.1 += cluster.frequency_24h;
    }

    let mut points: Vec<Value> = buckets
        .into_iter()
        .map(|(hour, (clusters, exceptions))| {
            json!({ "hour": hour, "clusters": clusters, "exceptions": exceptions })
        })
        .collect();
    points.sort_by(|a, b| a["hour"].as_str().cmp(&b["hour"].as_str()));

    Ok(Json(json!({ "points": points, "generated_at": Utc::now() })))
}

/// Per-service cluster and exception counts.
pub async fn by_service(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, ApiError> {
    let clusters = state.store.list_clusters(&filter_from(&query, None)).await?;
    let services = state.store.list_services(false).await?;
    let names: HashMap<&str, &str> = services
        .iter()
        .map(|s| (s.service_id.as_str(), s.name.as_str()))
        .collect();

    let mut rows: HashMap<String, (u64, u64, u64)> = HashMap::new();
    for cluster in &clusters {
        let entry = rows.entry(cluster.service_id.clone()).or_default();
        entry.0 += 1;
        entry.1 += cluster.cluster_size;
        if cluster.status == ClusterStatus::Active {
            entry.2 += 1;
        }
    }

    let body: Vec<Value> = rows
        .into_iter()
        .map(|(service_id, (clusters, exceptions, active))| {
            json!({
                "service_id": service_id,
                "service_name": names.get(service_id.as_str()).copied().unwrap_or(""),
                "clusters": clusters,
                "active_clusters": active,
                "total_exceptions": exceptions,
            })
        })
        .collect();
    Ok(Json(json!({ "services": body })))
}

/// Cluster counts by derived severity.
pub async fn by_severity(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, ApiError> {
    let clusters = state
        .store
        .list_clusters(&filter_from(&query, Some(ClusterStatus::Active)))
        .await?;

    let mut counts = HashMap::from([
        (ClusterSeverity::Low, 0u64),
        (ClusterSeverity::Medium, 0u64),
        (ClusterSeverity::High, 0u64),
        (ClusterSeverity::Critical, 0u64),
    ]);
    for cluster in &clusters {
        *counts.entry(cluster.severity()).or_default() += 1;
    }

    Ok(Json(json!({
        "low": counts[&ClusterSeverity::Low],
        "medium": counts[&ClusterSeverity::Medium],
        "high": counts[&ClusterSeverity::High],
        "critical": counts[&ClusterSeverity::Critical],
    })))
}
