use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use clausewise_core::config::RetrievalConfig;
use clausewise_core::error::{Error, Result};
use clausewise_core::traits::{DenseIndex, EmbeddingService, SparseIndex};
use clausewise_core::types::{RetrievalCandidate, SearchHit};
use clausewise_llm::ServiceGuard;

use crate::expander::QueryVariant;
use crate::fusion::{fuse, merge_variants};

/// Sparse + dense search per query variant, fused and merged across
/// variants.
pub struct HybridRetriever {
    sparse: Arc<dyn SparseIndex>,
    dense: Arc<dyn DenseIndex>,
    embedder: Arc<dyn EmbeddingService>,
    guard: ServiceGuard,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(sparse: Arc<dyn SparseIndex>, dense: Arc<dyn DenseIndex>, embedder: Arc<dyn EmbeddingService>, guard: ServiceGuard, config: RetrievalConfig) -> Self {
        Self { sparse, dense, embedder, guard, config }
    }

    /// Top-K fused candidates over all variants. Fails only when every
    /// variant failed on both indexes.
    pub async fn retrieve(&self, variants: &[QueryVariant], scope: Option<&str>) -> Result<Vec<RetrievalCandidate>> {
        if variants.is_empty() {
            return Ok(Vec::new());
        }
        let results = join_all(variants.iter().map(|v| self.retrieve_variant(v, scope))).await;

        let mut lists = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (variant, result) in variants.iter().zip(results) {
            match result {
                Ok(list) => lists.push(list),
                Err(reason) => {
                    warn!(variant = %variant.text, %reason, "query variant failed on every index");
                    failures.push(reason);
                }
            }
        }
        if lists.is_empty() {
            return Err(Error::Retrieval(format!("all {} query variants failed: {}", variants.len(), failures.join("; "))));
        }

        let mut merged = merge_variants(lists);
        merged.truncate(self.config.top_k);
        debug!(candidates = merged.len(), variants = variants.len(), "hybrid retrieval merged");
        Ok(merged)
    }

    async fn retrieve_variant(&self, variant: &QueryVariant, scope: Option<&str>) -> std::result::Result<Vec<RetrievalCandidate>, String> {
        let m = self.config.fetch_k;
        let sparse: Option<Vec<SearchHit>> = if variant.dense_only() {
            None
        } else {
            match self.sparse.search(&variant.text, m, scope) {
                Ok(hits) => Some(hits),
                Err(e) => {
                    warn!(error = %e, "sparse search failed, continuing with dense only");
                    None
                }
            }
        };
        let dense = match self.dense_search(&variant.text, m, scope).await {
            Ok(hits) => Some(hits),
            Err(e) => {
                warn!(error = %e, "dense search failed, continuing with sparse only");
                None
            }
        };

        let (sparse, dense) = match (sparse, dense) {
            (None, None) => return Err("no index answered".into()),
            (s, d) => (s.unwrap_or_default(), d.unwrap_or_default()),
        };
        let mut fused = fuse(&sparse, &dense, self.config.alpha);
        fused.truncate(self.config.top_k);
        Ok(fused)
    }

    async fn dense_search(&self, text: &str, k: usize, scope: Option<&str>) -> Result<Vec<SearchHit>> {
        let input = [text.to_string()];
        let vectors = self
            .guard
            .call("embed_query", || self.embedder.embed(&input))
            .await
            .map_err(|e| Error::Retrieval(format!("query embedding failed: {}", e)))?;
        let vector = vectors.into_iter().next().ok_or_else(|| Error::Retrieval("embedding service returned no vector".into()))?;
        self.dense.search(&vector, k, scope)
    }
}
