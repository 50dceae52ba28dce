//! faultline server binary: configuration, wiring, and serving.

use std::sync::Arc;

use anyhow::Context;
use config::{LlmProvider, Settings};
use model::SourceType;
use pipeline::{Clusterer, Normalizer, Processor, RcaEngine};
use rca::llm::LlmConfig;
use rca::{OpenAiClient, RcaAnalyzer};
use scheduler::Scheduler;
use server::{
    build_router, AppState, DedupRing, RateLimiter, TokenRegistry, WebhookClusterNotifier,
};
use store::{
    Embedder, HashEmbedder, MemoryStore, MemoryVectorStore, MetaStore, QdrantHttp, VectorStore,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env().context("invalid configuration")?;
    settings.validate().context("configuration validation failed")?;

    let store: Arc<dyn MetaStore> = Arc::new(MemoryStore::new());
    let vectors: Arc<dyn VectorStore> = if std::env::var("VECTOR_DB_URL").is_ok() {
        info!(url = %settings.vector_db_url, "using qdrant vector store");
        Arc::new(QdrantHttp::new(&settings.vector_db_url, settings.vector_db_api_key.clone())?)
    } else {
        info!("using in-memory vector store");
        Arc::new(MemoryVectorStore::new())
    };
    if let Err(e) = vectors.ensure_collections(settings.embedding_dimension).await {
        warn!(error = %e, "could not initialize vector collections; continuing");
    }
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(settings.embedding_dimension));

    let clusterer = Clusterer::new(store.clone());
    let mut processor = Processor::new(clusterer.clone(), settings.processing_log_levels.clone());

    let rca_engine: Option<Arc<dyn RcaEngine>> = if settings.enable_llm_analysis {
        if settings.llm_provider == LlmProvider::Anthropic {
            // The gateway endpoint below expects the OpenAI-compatible
            // surface either way; only the base URL differs.
            info!("anthropic provider selected via compatible endpoint");
        }
        let llm = OpenAiClient::new(LlmConfig {
            api_url: settings.llm_api_url.clone(),
            api_key: settings.llm_api_key.clone(),
            model: settings.llm_model.clone(),
            temperature: settings.llm_temperature,
            max_tokens: settings.llm_max_tokens,
        })
        .context("LLM client configuration")?;
        let analyzer = Arc::new(RcaAnalyzer::new(
            store.clone(),
            vectors.clone(),
            embedder.clone(),
            Arc::new(llm),
        ));
        processor = processor.with_rca(analyzer.clone());
        Some(analyzer)
    } else {
        info!("LLM analysis disabled");
        None
    };

    if settings.enable_gchat_notifications {
        let notifier = notify::Notifier::from_env();
        if notifier.has_channels() {
            processor = processor.with_notifier(
                Arc::new(WebhookClusterNotifier::new(notifier, store.clone())),
                settings.gchat_notification_threshold,
            );
        } else {
            warn!("gchat notifications enabled but no channel configured");
        }
    }

    let processor = Arc::new(processor);
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        vectors.clone(),
        embedder,
        processor.clone(),
        rca_engine.clone(),
    ));
    tokio::spawn(Arc::clone(&scheduler).run(settings.scheduler_tick));

    let tokens = Arc::new(TokenRegistry::new());
    register_push_routes(&tokens, store.as_ref(), &settings).await;

    let state = AppState {
        store,
        clusterer,
        processor,
        scheduler,
        rca: rca_engine,
        normalizer: Normalizer::new(),
        tokens,
        limiter: Arc::new(RateLimiter::new(settings.fluent_bit_rate_limit)),
        dedup: Arc::new(DedupRing::new(settings.fluent_bit_dedup_window_seconds)),
        batch_limit: settings.fluent_bit_batch_size_limit,
    };

    let address = format!("{}:{}", settings.api_host, settings.api_port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("could not bind {address}"))?;
    info!(address, "faultline server listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

/// Register ingestion routes for every push-type log source. A source's
/// own credential wins; the global token is the fallback and routes to
/// the first push source found.
async fn register_push_routes(tokens: &TokenRegistry, store: &dyn MetaStore, settings: &Settings) {
    let services = match store.list_services(true).await {
        Ok(services) => services,
        Err(e) => {
            warn!(error = %e, "could not enumerate services for push routing");
            return;
        }
    };

    let mut global_registered = false;
    for service in &services {
        let sources = match store.list_log_sources(&service.service_id, false).await {
            Ok(sources) => sources,
            Err(_) => continue,
        };
        for source in sources
            .iter()
            .filter(|s| s.source_type == SourceType::Fluentd && s.is_active)
        {
            if let Some(token) = source.password.as_deref().filter(|t| !t.is_empty()) {
                tokens.register(token, &service.service_id, &source.log_source_id);
            } else if !settings.fluent_bit_api_token.is_empty() && !global_registered {
                tokens.register(
                    &settings.fluent_bit_api_token,
                    &service.service_id,
                    &source.log_source_id,
                );
                global_registered = true;
            }
        }
    }
    if !global_registered && settings.fluent_bit_api_token.is_empty() {
        info!("no push tokens registered; ingestion endpoint will reject all requests");
    }
}
