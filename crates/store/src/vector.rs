//! Vector-store adapter: trait, in-memory backend, Qdrant REST backend.

use async_trait::async_trait;
use model::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Collection holding code-block embeddings.
pub const CODE_COLLECTION: &str = "code_embeddings";
/// Collection holding log-summary embeddings.
pub const LOG_COLLECTION: &str = "log_embeddings";

/// A point to upsert: id, embedding, and a JSON payload for filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Value,
}

/// A search hit with its cosine similarity score.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: Value,
}

/// Equality conditions on payload fields.
pub type PayloadFilter = Vec<(String, Value)>;

/// Vector storage operations. Cosine distance, dimension set by the
/// embedding model. Upstream failures surface immediately; there are no
/// retries at this layer.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn ensure_collections(&self, dimension: usize) -> Result<()>;
    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()>;
    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        top_k: usize,
        filter: &PayloadFilter,
    ) -> Result<Vec<ScoredPoint>>;
    async fn delete_by_filter(&self, collection: &str, filter: &PayloadFilter) -> Result<u64>;

    /// Delete-by-filter then upsert as one observable step. The in-memory
    /// backend runs both under a single lock; remote backends sequence the
    /// two calls, which is acceptable because the relational store is the
    /// source of truth for block existence.
    async fn replace(
        &self,
        collection: &str,
        filter: &PayloadFilter,
        points: Vec<VectorPoint>,
    ) -> Result<()> {
        self.delete_by_filter(collection, filter).await?;
        self.upsert(collection, points).await
    }
}

fn payload_matches(payload: &Value, filter: &PayloadFilter) -> bool {
    filter.iter().all(|(key, expected)| payload.get(key) == Some(expected))
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// In-memory vector store; the reference and test backend.
#[derive(Clone, Default)]
pub struct MemoryVectorStore {
    collections: Arc<RwLock<HashMap<String, Vec<VectorPoint>>>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ensure_collections(&self, _dimension: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        for name in [CODE_COLLECTION, LOG_COLLECTION] {
            collections.entry(name.to_string()).or_default();
        }
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let entries = collections.entry(collection.to_string()).or_default();
        for point in points {
            entries.retain(|p| p.id != point.id);
            entries.push(point);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        top_k: usize,
        filter: &PayloadFilter,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().await;
        let entries = collections.get(collection).cloned().unwrap_or_default();
        let mut hits: Vec<ScoredPoint> = entries
            .iter()
            .filter(|p| payload_matches(&p.payload, filter))
            .map(|p| ScoredPoint {
                id: p.id.clone(),
                score: cosine(&vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete_by_filter(&self, collection: &str, filter: &PayloadFilter) -> Result<u64> {
        let mut collections = self.collections.write().await;
        let entries = collections.entry(collection.to_string()).or_default();
        let before = entries.len();
        entries.retain(|p| !payload_matches(&p.payload, filter));
        Ok((before - entries.len()) as u64)
    }

    async fn replace(
        &self,
        collection: &str,
        filter: &PayloadFilter,
        points: Vec<VectorPoint>,
    ) -> Result<()> {
        // One critical section so a concurrent search never sees the file
        // half-replaced.
        let mut collections = self.collections.write().await;
        let entries = collections.entry(collection.to_string()).or_default();
        entries.retain(|p| !payload_matches(&p.payload, filter));
        for point in points {
            entries.retain(|p| p.id != point.id);
            entries.push(point);
        }
        Ok(())
    }
}

/// Qdrant REST adapter.
#[derive(Clone)]
pub struct QdrantHttp {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantHttp {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build vector store client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, format!("{}{path}", self.base_url));
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Value> {
        let response = builder
            .send()
            .await
            .map_err(|e| Error::upstream("qdrant", e.to_string()))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::upstream("qdrant", format!("invalid response body: {e}")))?;
        if !status.is_success() {
            return Err(Error::upstream(
                "qdrant",
                format!("status {status}: {body}"),
            ));
        }
        Ok(body)
    }

    fn filter_json(filter: &PayloadFilter) -> Value {
        let must: Vec<Value> = filter
            .iter()
            .map(|(key, value)| json!({ "key": key, "match": { "value": value } }))
            .collect();
        json!({ "must": must })
    }
}

#[async_trait]
impl VectorStore for QdrantHttp {
    async fn ensure_collections(&self, dimension: usize) -> Result<()> {
        for name in [CODE_COLLECTION, LOG_COLLECTION] {
            let exists = self
                .send(self.request(reqwest::Method::GET, &format!("/collections/{name}")))
                .await
                .is_ok();
            if exists {
                continue;
            }
            self.send(
                self.request(reqwest::Method::PUT, &format!("/collections/{name}")).json(&json!({
                    "vectors": { "size": dimension, "distance": "Cosine" }
                })),
            )
            .await?;
            debug!(collection = name, "created vector collection");
        }
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let body: Vec<Value> = points
            .iter()
            .map(|p| json!({ "id": p.id, "vector": p.vector, "payload": p.payload }))
            .collect();
        self.send(
            self.request(
                reqwest::Method::PUT,
                &format!("/collections/{collection}/points?wait=true"),
            )
            .json(&json!({ "points": body })),
        )
        .await?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        top_k: usize,
        filter: &PayloadFilter,
    ) -> Result<Vec<ScoredPoint>> {
        let mut body = json!({ "vector": vector, "limit": top_k, "with_payload": true });
        if !filter.is_empty() {
            body["filter"] = Self::filter_json(filter);
        }
        let response = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("/collections/{collection}/points/search"),
                )
                .json(&body),
            )
            .await?;

        let hits = response
            .get("result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                Some(ScoredPoint {
                    id: match hit.get("id")? {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    },
                    score: hit.get("score")?.as_f64()? as f32,
                    payload: hit.get("payload").cloned().unwrap_or(Value::Null),
                })
            })
            .collect())
    }

    async fn delete_by_filter(&self, collection: &str, filter: &PayloadFilter) -> Result<u64> {
        self.send(
            self.request(
                reqwest::Method::POST,
                &format!("/collections/{collection}/points/delete?wait=true"),
            )
            .json(&json!({ "filter": Self::filter_json(filter) })),
        )
        .await?;
        // Qdrant does not report the deleted count for filter deletes.
        Ok(0)
    }
}
