//! Manual code-indexing trigger.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TriggerQuery {
    #[serde(default)]
    pub force_full: bool,
}

pub async fn trigger(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
    Query(query): Query<TriggerQuery>,
) -> Result<Json<Value>, ApiError> {
    let stats = state
        .scheduler
        .trigger_code_indexing(&service_id, query.force_full)
        .await?;
    Ok(Json(json!({ "service_id": service_id, "stats": stats })))
}
