//! RCA retrieval, on-demand generation, and feedback.

use axum::extract::{Path, State};
use axum::Json;
use model::{Error, RcaResult};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn latest(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
) -> Result<Json<RcaResult>, ApiError> {
    // 404 distinguishes a missing cluster from a cluster without an RCA.
    state.store.get_cluster(&cluster_id).await?;
    let rca = state
        .store
        .latest_rca(&cluster_id)
        .await?
        .ok_or_else(|| Error::not_found("rca", &cluster_id))?;
    Ok(Json(rca))
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub cluster_id: String,
}

/// Explicit user request: bypasses the trigger policy and analyzes now.
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<Value>, ApiError> {
    let Some(rca) = &state.rca else {
        return Err(Error::Validation("LLM analysis is disabled".into()).into());
    };
    state.store.get_cluster(&request.cluster_id).await?;
    let rca_id = rca.analyze_cluster(&request.cluster_id).await?;
    Ok(Json(json!({ "rca_id": rca_id, "cluster_id": request.cluster_id })))
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    /// In `[0, 1]`.
    pub score: f64,
}

pub async fn feedback(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<Value>, ApiError> {
    let rca = state.store.apply_rca_feedback(&cluster_id, request.score).await?;
    Ok(Json(json!({
        "rca_id": rca.rca_id,
        "validation_score": rca.validation_score,
        "feedback_count": rca.feedback_count,
    })))
}
