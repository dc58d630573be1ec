use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use clausewise_core::error::Result;
use clausewise_core::traits::FragmentStore;
use clausewise_core::types::{FragmentId, ParentFragment, RetrievalCandidate};

/// A parent passage selected as generation context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedContext {
    pub parent: ParentFragment,
    /// Best relevance among the children that pointed here.
    pub score: f32,
    pub child_ids: Vec<FragmentId>,
}

/// Maps ranked child candidates to their parents.
pub struct ContextResolver {
    store: Arc<dyn FragmentStore>,
}

impl ContextResolver {
    pub fn new(store: Arc<dyn FragmentStore>) -> Self {
        Self { store }
    }

    /// One context per distinct parent, in order of first appearance.
    pub fn resolve(&self, candidates: &[RetrievalCandidate]) -> Result<Vec<ResolvedContext>> {
        let mut out: Vec<ResolvedContext> = Vec::new();
        let mut position: HashMap<FragmentId, usize> = HashMap::new();

        for c in candidates {
            let Some(child) = self.store.child(&c.fragment_id)? else {
                warn!(fragment_id = %c.fragment_id, "candidate fragment missing from store, skipped");
                continue;
            };
            let score = c.relevance();
            if let Some(&i) = position.get(&child.parent_id) {
                let ctx = &mut out[i];
                ctx.score = ctx.score.max(score);
                ctx.child_ids.push(child.id);
                continue;
            }
            let Some(parent) = self.store.parent(&child.parent_id)? else {
                warn!(parent_id = %child.parent_id, fragment_id = %child.id, "parent fragment missing from store, skipped");
                continue;
            };
            position.insert(parent.id.clone(), out.len());
            out.push(ResolvedContext { parent, score, child_ids: vec![child.id] });
        }
        Ok(out)
    }
}
