use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use clausewise_core::traits::{FragmentStore, RerankService};
use clausewise_core::types::RetrievalCandidate;
use clausewise_llm::ServiceGuard;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RerankMode {
    Reranked,
    /// Reranking was attempted and failed; candidates are in fused order.
    Degraded { reason: String },
    Disabled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RerankOutcome {
    pub candidates: Vec<RetrievalCandidate>,
    pub mode: RerankMode,
}

impl RerankOutcome {
    fn new(candidates: Vec<RetrievalCandidate>, mode: RerankMode) -> Self {
        Self { candidates, mode }
    }
}

/// Reorders fused candidates by an independent relevance score. Never
/// fails: every problem yields the input order with a `Degraded` mode.
pub struct Reranker {
    service: Option<Arc<dyn RerankService>>,
    store: Arc<dyn FragmentStore>,
    guard: ServiceGuard,
    enabled: bool,
}

impl Reranker {
    pub fn new(service: Option<Arc<dyn RerankService>>, store: Arc<dyn FragmentStore>, guard: ServiceGuard, enabled: bool) -> Self {
        Self { service, store, guard, enabled }
    }

    pub async fn rerank(&self, query: &str, candidates: Vec<RetrievalCandidate>) -> RerankOutcome {
        if !self.enabled {
            return RerankOutcome::new(candidates, RerankMode::Disabled);
        }
        let Some(service) = self.service.as_deref() else {
            return degraded(candidates, "no rerank service configured".into());
        };
        if candidates.is_empty() {
            return RerankOutcome::new(candidates, RerankMode::Reranked);
        }

        let mut texts = Vec::with_capacity(candidates.len());
        for c in &candidates {
            match self.store.child(&c.fragment_id) {
                Ok(Some(child)) => texts.push(child.text),
                Ok(None) => return degraded(candidates.clone(), format!("fragment '{}' not in store", c.fragment_id)),
                Err(e) => return degraded(candidates.clone(), format!("fragment lookup failed: {}", e)),
            }
        }

        let scores = match self.guard.call("rerank", || service.score(query, &texts)).await {
            Ok(scores) => scores,
            Err(e) => return degraded(candidates, format!("{} failed: {}", service.name(), e)),
        };
        if scores.len() != candidates.len() {
            return degraded(candidates, format!("{} returned {} scores for {} candidates", service.name(), scores.len(), texts.len()));
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return degraded(candidates, format!("{} returned non-finite scores", service.name()));
        }

        let mut reranked: Vec<RetrievalCandidate> = candidates
            .into_iter()
            .zip(scores)
            .map(|(mut c, s)| {
                c.rerank_score = Some(s);
                c
            })
            .collect();
        // stable: equal rerank scores keep fused order
        reranked.sort_by(|a, b| b.rerank_score.partial_cmp(&a.rerank_score).unwrap_or(std::cmp::Ordering::Equal));
        debug!(candidates = reranked.len(), service = service.name(), "reranked");
        RerankOutcome::new(reranked, RerankMode::Reranked)
    }
}

fn degraded(candidates: Vec<RetrievalCandidate>, reason: String) -> RerankOutcome {
    warn!(%reason, "rerank degraded to fused order");
    RerankOutcome { candidates, mode: RerankMode::Degraded { reason } }
}
