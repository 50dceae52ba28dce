//! The RCA engine: retrieval, LLM call, strict parse, persistence.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use model::{
    prefixed_id, CodeBlock, Error, ExceptionCluster, InvolvedParameter, RcaResult, Result,
    SupportingEvidence,
};
use serde::Deserialize;
use serde_json::json;
use store::{Embedder, MetaStore, VectorStore, CODE_COLLECTION};
use tracing::{debug, info, warn};

use crate::llm::LlmClient;
use crate::prompt::{build_user_prompt, SYSTEM_PROMPT};

/// Frames used for retrieval queries.
const RETRIEVAL_FRAMES: usize = 5;
/// Hits requested per frame query.
const RETRIEVAL_TOP_K: usize = 7;
/// Deduped blocks kept for the prompt.
const RETRIEVAL_KEEP: usize = 10;
/// A cluster younger than this always qualifies for RCA.
const NEW_CLUSTER_WINDOW_SECS: i64 = 3600;
/// 24h frequency at which RCA triggers.
const FREQUENCY_TRIGGER: u64 = 10;

#[derive(Deserialize)]
struct RcaPayload {
    likely_root_cause: RootCause,
    #[serde(default)]
    supporting_evidence: Vec<SupportingEvidence>,
    #[serde(default)]
    involved_parameters: Vec<InvolvedParameter>,
    #[serde(default)]
    fix_suggestions: Vec<String>,
    #[serde(default)]
    tests_to_add: Vec<String>,
}

#[derive(Deserialize)]
struct RootCause {
    file_path: String,
    symbol: String,
    #[serde(default)]
    line_range: Vec<u32>,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    explanation: String,
}

/// Generates and persists RCA artifacts for clusters.
pub struct RcaAnalyzer {
    store: Arc<dyn MetaStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LlmClient>,
}

impl RcaAnalyzer {
    pub fn new(
        store: Arc<dyn MetaStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self { store, vectors, embedder, llm }
    }

    /// Analyze one cluster end to end and return the new RCA id.
    pub async fn analyze(&self, cluster_id: &str) -> Result<String> {
        // Snapshot the cluster up front; everything below works off the
        // copy, so no storage handle is held across the slow calls.
        let cluster = self.store.get_cluster(cluster_id).await?;

        let blocks = self.retrieve_code_context(&cluster).await?;
        debug!(cluster_id, blocks = blocks.len(), "retrieved code context");

        let user_prompt = build_user_prompt(&cluster, &blocks);
        let response = self
            .llm
            .complete(SYSTEM_PROMPT, &user_prompt)
            .await
            .map_err(Error::from)?;

        let payload = parse_payload(&response.content)?;

        let rca_id = prefixed_id("rca");
        let root = payload.likely_root_cause;
        let now = Utc::now();
        self.store
            .insert_rca(RcaResult {
                rca_id: rca_id.clone(),
                cluster_id: cluster_id.to_string(),
                root_cause_file: root.file_path,
                root_cause_symbol: root.symbol,
                root_cause_line_start: root.line_range.first().copied().unwrap_or(0),
                root_cause_line_end: root.line_range.get(1).copied().unwrap_or(0),
                confidence_score: root.confidence.clamp(0.0, 1.0),
                explanation: root.explanation,
                involved_parameters: payload.involved_parameters,
                fix_suggestions: payload.fix_suggestions,
                tests_to_add: payload.tests_to_add,
                supporting_evidence: payload.supporting_evidence,
                llm_model: response.model,
                llm_tokens_used: response.tokens_used,
                validation_score: None,
                feedback_count: 0,
                created_at: now,
            })
            .await?;
        self.store.mark_rca_generated(cluster_id, now).await?;

        info!(cluster_id, rca_id, "RCA persisted");
        Ok(rca_id)
    }

    /// Vector retrieval keyed on the top stack frames, deduplicated by
    /// block id, hydrated from the relational store.
    async fn retrieve_code_context(&self, cluster: &ExceptionCluster) -> Result<Vec<CodeBlock>> {
        let filter = vec![("service_id".to_string(), json!(cluster.service_id))];
        let mut seen: HashSet<String> = HashSet::new();
        let mut ordered_ids: Vec<String> = Vec::new();

        for frame in cluster.stack_trace.iter().take(RETRIEVAL_FRAMES) {
            let query = format!("{} {}", frame.symbol, frame.file);
            let hits = match self
                .vectors
                .search(CODE_COLLECTION, self.embedder.embed(&query), RETRIEVAL_TOP_K, &filter)
                .await
            {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(query, error = %e, "code search failed, continuing");
                    continue;
                }
            };
            for hit in hits {
                if seen.insert(hit.id.clone()) {
                    ordered_ids.push(hit.id);
                }
            }
        }
        ordered_ids.truncate(RETRIEVAL_KEEP);

        let mut blocks = Vec::with_capacity(ordered_ids.len());
        for id in &ordered_ids {
            if let Some(block) = self.store.get_code_block(id).await? {
                blocks.push(block);
            }
        }
        Ok(blocks)
    }

    /// Trigger policy: no RCA yet, and either hot (≥ 10 in 24h) or new
    /// (first seen within the last hour). Explicit user requests bypass
    /// this check and call [`analyze`](Self::analyze) directly.
    pub fn should_trigger(&self, cluster: &ExceptionCluster) -> bool {
        if cluster.has_rca {
            return false;
        }
        if cluster.frequency_24h >= FREQUENCY_TRIGGER {
            info!(cluster_id = %cluster.cluster_id, frequency = cluster.frequency_24h, "RCA trigger: high frequency");
            return true;
        }
        let age = Utc::now() - cluster.first_seen;
        if age.num_seconds() < NEW_CLUSTER_WINDOW_SECS {
            info!(cluster_id = %cluster.cluster_id, "RCA trigger: new cluster");
            return true;
        }
        false
    }
}

#[async_trait]
impl pipeline::RcaEngine for RcaAnalyzer {
    async fn should_trigger_rca(&self, cluster: &ExceptionCluster) -> bool {
        self.should_trigger(cluster)
    }

    async fn analyze_cluster(&self, cluster_id: &str) -> Result<String> {
        self.analyze(cluster_id).await
    }
}

/// Strict parse of the LLM's JSON: `likely_root_cause` with a non-empty
/// location is required, and at least one fix suggestion must be present
/// for the artifact to be worth persisting.
fn parse_payload(content: &str) -> Result<RcaPayload> {
    let payload: RcaPayload = serde_json::from_str(content)
        .map_err(|e| Error::Parse(format!("LLM response is not valid RCA JSON: {e}")))?;
    if payload.likely_root_cause.file_path.is_empty()
        || payload.likely_root_cause.symbol.is_empty()
    {
        return Err(Error::Parse(
            "likely_root_cause must name a file and symbol".into(),
        ));
    }
    if payload.fix_suggestions.is_empty() {
        return Err(Error::Parse("RCA carries no fix suggestions".into()));
    }
    Ok(payload)
}
