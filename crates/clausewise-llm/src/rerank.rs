use async_trait::async_trait;

use clausewise_core::error::ServiceError;
use clausewise_core::traits::RerankService;

/// Lexical relevance scorer used when no cross-encoder is available.
///
/// BM25-style saturation of each query term's frequency in the text,
/// averaged over query terms. Document length is normalized against a
/// fixed average of 500 chars. The mean `m` is reported as `m / (1 + m)`,
/// so scores stay in `[0, 1)` like fused scores.
#[derive(Debug, Clone)]
pub struct TermOverlapScorer {
    k1: f32,
    b: f32,
    avg_len: f32,
}

impl Default for TermOverlapScorer {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75, avg_len: 500.0 }
    }
}

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric()).filter(|t| t.len() > 2).map(|t| t.to_lowercase()).collect()
}

impl TermOverlapScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relevance(&self, query: &str, text: &str) -> f32 {
        let query_terms = terms(query);
        let doc_terms = terms(text);
        if query_terms.is_empty() || doc_terms.is_empty() {
            return 0.0;
        }
        let doc_len = text.chars().count() as f32;
        let norm = self.k1 * (1.0 - self.b + self.b * (doc_len / self.avg_len));
        let score: f32 = query_terms
            .iter()
            .map(|q| {
                let tf = doc_terms.iter().filter(|t| *t == q).count() as f32;
                if tf > 0.0 {
                    tf * (self.k1 + 1.0) / (tf + norm)
                } else {
                    0.0
                }
            })
            .sum();
        let mean = score / query_terms.len() as f32;
        mean / (1.0 + mean)
    }
}

#[async_trait]
impl RerankService for TermOverlapScorer {
    fn name(&self) -> &str {
        "term-overlap"
    }

    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, ServiceError> {
        Ok(texts.iter().map(|t| self.relevance(query, t)).collect())
    }
}
