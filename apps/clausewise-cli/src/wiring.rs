use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use clausewise_core::config::{EmbeddingProvider, Settings};
use clausewise_core::traits::{EmbeddingService, GenerationService};
use clausewise_llm::{select_backend, HashEmbedder, OpenAiCompatClient, SystemClock, TermOverlapScorer};
use clausewise_orchestrator::{Engine, EngineHandles};
use clausewise_text::TantivySparseIndex;
use clausewise_vector::{MemoryDenseIndex, MemoryFragmentStore};

/// Build an engine over in-memory indexes and the configured backends.
pub async fn build_engine(settings: &Settings) -> Result<Engine> {
    let probe_timeout = Duration::from_millis(settings.llm.probe_timeout_ms);
    let primary = OpenAiCompatClient::from_config(&settings.llm.primary, probe_timeout)?;

    let embedder: Arc<dyn EmbeddingService> = match settings.embedding.provider {
        EmbeddingProvider::Hash => Arc::new(HashEmbedder::new(settings.embedding.dim)),
        EmbeddingProvider::Remote => {
            Arc::new(primary.clone().with_embedding_model(settings.embedding.model.clone(), settings.embedding.dim))
        }
    };
    info!(model = embedder.model_id(), dim = embedder.dim(), "embedding service ready");

    let fallback: Option<Arc<dyn GenerationService>> = match &settings.llm.fallback {
        Some(config) => Some(Arc::new(OpenAiCompatClient::from_config(config, probe_timeout)?)),
        None => None,
    };
    let backend = select_backend(Arc::new(primary), fallback).await;

    let handles = EngineHandles {
        sparse: Arc::new(TantivySparseIndex::in_memory().context("creating keyword index")?),
        dense: Arc::new(MemoryDenseIndex::new()),
        store: Arc::new(MemoryFragmentStore::new()),
        embedder,
        backend,
        reranker: Some(Arc::new(TermOverlapScorer::new())),
        clock: Arc::new(SystemClock),
    };
    Ok(Engine::new(settings, handles)?)
}
