//! Shared application state.

use std::sync::Arc;

use pipeline::{Clusterer, Normalizer, Processor, RcaEngine};
use scheduler::Scheduler;
use store::MetaStore;

use crate::auth::TokenRegistry;
use crate::dedup::DedupRing;
use crate::ratelimit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetaStore>,
    pub clusterer: Clusterer,
    pub processor: Arc<Processor>,
    pub scheduler: Arc<Scheduler>,
    pub rca: Option<Arc<dyn RcaEngine>>,
    pub normalizer: Normalizer,
    pub tokens: Arc<TokenRegistry>,
    pub limiter: Arc<RateLimiter>,
    pub dedup: Arc<DedupRing>,
    /// Max records per pushed batch.
    pub batch_limit: usize,
}
