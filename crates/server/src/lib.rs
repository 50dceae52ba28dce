//! HTTP surface for the faultline platform.
//!
//! The router exposes the ingestion endpoint, cluster triage, RCA
//! retrieval and generation, the manual indexing trigger, and the
//! read-only aggregates. State is one cloneable struct of shared
//! handles; all persistence goes through the store adapters.

pub mod auth;
pub mod dedup;
pub mod error;
pub mod notifier;
pub mod ratelimit;
pub mod routes;
pub mod state;

pub use auth::TokenRegistry;
pub use dedup::DedupRing;
pub use error::ApiError;
pub use notifier::WebhookClusterNotifier;
pub use ratelimit::RateLimiter;
pub use state::AppState;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the HTTP router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Push ingestion
        .route("/api/v1/ingest", post(routes::ingest::ingest))
        // Cluster triage
        .route("/api/v1/clusters", get(routes::clusters::list))
        .route("/api/v1/clusters/{id}", get(routes::clusters::detail))
        .route("/api/v1/clusters/{id}/skip", post(routes::clusters::skip))
        .route("/api/v1/clusters/{id}/resolve", post(routes::clusters::resolve))
        .route("/api/v1/clusters/{id}/reactivate", post(routes::clusters::reactivate))
        // RCA
        .route("/api/v1/rca/generate", post(routes::rca::generate))
        .route("/api/v1/rca/{cluster_id}", get(routes::rca::latest))
        .route("/api/v1/rca/{cluster_id}/feedback", post(routes::rca::feedback))
        // Code indexing
        .route(
            "/api/v1/code-indexing/services/{service_id}/trigger",
            post(routes::indexing::trigger),
        )
        // Aggregates
        .route("/api/v1/stats", get(routes::stats::overview))
        .route("/api/v1/trends", get(routes::stats::trends))
        .route("/api/v1/stats/services", get(routes::stats::by_service))
        .route("/api/v1/stats/severity", get(routes::stats::by_severity))
        // Services
        .route("/api/v1/services", get(routes::services::list))
        .route("/api/v1/services/{service_id}/status", get(routes::services::status))
        // Health
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
