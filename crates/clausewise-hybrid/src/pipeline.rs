use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use clausewise_core::error::Result;
use clausewise_core::types::RetrievalCandidate;

use crate::expander::{QueryExpander, QueryVariant};
use crate::reranker::{RerankMode, Reranker};
use crate::resolver::{ContextResolver, ResolvedContext};
use crate::retriever::HybridRetriever;

/// Everything one retrieval produced, in the order it was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalReport {
    pub query: String,
    pub variants: Vec<QueryVariant>,
    pub candidates: Vec<RetrievalCandidate>,
    pub rerank: RerankMode,
    pub contexts: Vec<ResolvedContext>,
    pub latency_ms: u64,
}

/// Expand, retrieve, rerank, resolve.
pub struct RetrievalPipeline {
    expander: QueryExpander,
    retriever: HybridRetriever,
    reranker: Reranker,
    resolver: ContextResolver,
}

impl RetrievalPipeline {
    pub fn new(expander: QueryExpander, retriever: HybridRetriever, reranker: Reranker, resolver: ContextResolver) -> Self {
        Self { expander, retriever, reranker, resolver }
    }

    pub async fn run(&self, query: &str, scope: Option<&str>) -> Result<RetrievalReport> {
        let started = Instant::now();
        let variants = self.expander.expand(query).await;
        let fused = self.retriever.retrieve(&variants, scope).await?;
        let reranked = self.reranker.rerank(query, fused).await;
        let contexts = self.resolver.resolve(&reranked.candidates)?;
        let latency_ms = started.elapsed().as_millis() as u64;
        info!(
            variants = variants.len(),
            candidates = reranked.candidates.len(),
            contexts = contexts.len(),
            latency_ms,
            "retrieval complete"
        );
        Ok(RetrievalReport { query: query.to_string(), variants, candidates: reranked.candidates, rerank: reranked.mode, contexts, latency_ms })
    }
}
