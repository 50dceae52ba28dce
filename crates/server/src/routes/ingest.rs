//! Push-ingestion endpoint.
//!
//! Authenticated batch intake: constant-time token check, hard batch-size
//! bound, whole-batch token-bucket admission, per-record validation and
//! deduplication. Records are durably enqueued (handed to the processor
//! task) before the response goes out; processing itself is asynchronous.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::auth::bearer_token;
use crate::error::ApiError;
use crate::dedup::DedupRing;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub records: Vec<Value>,
    /// Free-form label agents may attach; logged, not interpreted.
    #[serde(default)]
    pub source_hint: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct IngestResponse {
    pub accepted: u64,
    pub duplicates: u64,
    pub rejected: u64,
}

pub async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    let presented = bearer_token(
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok()),
    )
    .map_err(ApiError::from)?;
    let destination = state.tokens.authenticate(presented)?;

    if request.records.len() > state.batch_limit {
        return Err(ApiError::PayloadTooLarge {
            limit: state.batch_limit,
            got: request.records.len(),
        });
    }

    // Admission is all-or-nothing; over-limit batches carry a
    // retry-after hint. The bucket key is the authenticated token.
    if let Err(retry_after_secs) = state
        .limiter
        .try_acquire(presented, request.records.len() as u64)
    {
        return Err(ApiError::RateLimited { retry_after_secs });
    }

    let mut response = IngestResponse { accepted: 0, duplicates: 0, rejected: 0 };
    let mut fresh = Vec::with_capacity(request.records.len());

    for record in &request.records {
        let Some((timestamp, message)) = validate_record(record) else {
            response.rejected += 1;
            continue;
        };

        let key = DedupRing::record_key(&destination.log_source_id, timestamp, message);
        if !state.dedup.insert(key) {
            response.duplicates += 1;
            continue;
        }

        response.accepted += 1;
        fresh.push(record.clone());
    }

    if !fresh.is_empty() {
        let normalized = state.normalizer.normalize_batch(&fresh);
        let processor = state.processor.clone();
        let log_source_id = destination.log_source_id.clone();
        tokio::spawn(async move {
            if let Err(e) = processor.process_records(&normalized, &log_source_id).await {
                error!(log_source_id, error = %e, "push batch processing failed");
            }
        });
    }

    info!(
        service_id = %destination.service_id,
        log_source_id = %destination.log_source_id,
        source_hint = request.source_hint.as_deref().unwrap_or("-"),
        accepted = response.accepted,
        duplicates = response.duplicates,
        rejected = response.rejected,
        "ingest batch"
    );
    Ok(Json(response))
}

/// A pushed record must carry at least an ISO-8601 `timestamp` and a
/// non-empty `message`.
fn validate_record(record: &Value) -> Option<(&str, &str)> {
    let timestamp = record.get("timestamp").and_then(Value::as_str)?;
    if !is_iso8601(timestamp) {
        debug!(timestamp, "rejecting record with unparseable timestamp");
        return None;
    }
    let message = record.get("message").and_then(Value::as_str)?;
    if message.trim().is_empty() {
        return None;
    }
    Some((timestamp, message))
}

fn is_iso8601(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_record() {
        let good = serde_json::json!({
            "timestamp": "2024-01-15T10:30:00Z", "message": "boom"
        });
        assert!(validate_record(&good).is_some());

        let naive = serde_json::json!({
            "timestamp": "2024-01-15T10:30:00.123", "message": "boom"
        });
        assert!(validate_record(&naive).is_some());

        let bad_ts = serde_json::json!({ "timestamp": "yesterday", "message": "boom" });
        assert!(validate_record(&bad_ts).is_none());

        let no_message = serde_json::json!({ "timestamp": "2024-01-15T10:30:00Z" });
        assert!(validate_record(&no_message).is_none());

        let blank_message =
            serde_json::json!({ "timestamp": "2024-01-15T10:30:00Z", "message": "  " });
        assert!(validate_record(&blank_message).is_none());
    }
}
