use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use clausewise_core::config::ExpansionConfig;
use clausewise_core::error::ServiceError;
use clausewise_core::traits::{GenerationRequest, GenerationService};
use clausewise_llm::ServiceGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    Original,
    Phrasing,
    /// Synthetic answer passage; searched against the dense index only.
    Hypothetical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryVariant {
    pub text: String,
    pub kind: VariantKind,
}

impl QueryVariant {
    pub fn original(text: impl Into<String>) -> Self {
        Self { text: text.into(), kind: VariantKind::Original }
    }

    pub fn dense_only(&self) -> bool {
        self.kind == VariantKind::Hypothetical
    }
}

const EXPANSION_SYSTEM: &str = "You assist with searching legal contracts.";

/// Optional query rewriting ahead of retrieval.
///
/// Any generation failure is logged and the affected strategy contributes
/// nothing; the original query is always the first variant.
pub struct QueryExpander {
    generator: Option<Arc<dyn GenerationService>>,
    guard: ServiceGuard,
    config: ExpansionConfig,
}

impl QueryExpander {
    pub fn new(generator: Option<Arc<dyn GenerationService>>, guard: ServiceGuard, config: ExpansionConfig) -> Self {
        Self { generator, guard, config }
    }

    /// No generator and no strategies: the query passes through unchanged.
    pub fn passthrough(guard: ServiceGuard) -> Self {
        Self::new(None, guard, ExpansionConfig { hypothetical_answer: false, multi_phrasing: false, ..ExpansionConfig::default() })
    }

    pub async fn expand(&self, query: &str) -> Vec<QueryVariant> {
        let mut variants = vec![QueryVariant::original(query)];
        let Some(generator) = self.generator.as_deref() else {
            return variants;
        };

        let phrasings = async {
            if self.config.multi_phrasing {
                self.phrasings(generator, query).await
            } else {
                Vec::new()
            }
        };
        let hypothetical = async {
            if self.config.hypothetical_answer {
                self.hypothetical(generator, query).await
            } else {
                None
            }
        };
        let (phrasings, hypothetical) = futures::join!(phrasings, hypothetical);

        variants.extend(phrasings.into_iter().map(|text| QueryVariant { text, kind: VariantKind::Phrasing }));
        variants.extend(hypothetical.map(|text| QueryVariant { text, kind: VariantKind::Hypothetical }));
        debug!(variants = variants.len(), "query expanded");
        variants
    }

    async fn generate_json(&self, generator: &dyn GenerationService, request: GenerationRequest) -> Result<Value, ServiceError> {
        self.guard.call(&request.purpose, || generator.generate(&request)).await
    }

    async fn phrasings(&self, generator: &dyn GenerationService, query: &str) -> Vec<String> {
        let n = self.config.phrasings;
        let request = GenerationRequest {
            purpose: "multi_query".into(),
            system: EXPANSION_SYSTEM.into(),
            prompt: format!(
                "Write {} alternative phrasings of the question below. Each should use different legal vocabulary for the same information need.\n\nQuestion: {}",
                n, query
            ),
            schema: json!({
                "type": "object",
                "properties": { "queries": { "type": "array", "items": { "type": "string" } } },
                "required": ["queries"]
            }),
            temperature: 0.7,
            max_tokens: 400,
        };
        match self.generate_json(generator, request).await {
            Ok(value) => parse_phrasings(&value, query, n),
            Err(e) => {
                warn!(error = %e, "multi-phrasing expansion failed, using original query only");
                Vec::new()
            }
        }
    }

    async fn hypothetical(&self, generator: &dyn GenerationService, query: &str) -> Option<String> {
        let request = GenerationRequest {
            purpose: "hypothetical_answer".into(),
            system: EXPANSION_SYSTEM.into(),
            prompt: format!("Write a short contract clause (2-4 sentences) that would directly answer:\n\n{}", query),
            schema: json!({
                "type": "object",
                "properties": { "passage": { "type": "string" } },
                "required": ["passage"]
            }),
            temperature: 0.3,
            max_tokens: 300,
        };
        match self.generate_json(generator, request).await {
            Ok(value) => {
                let passage = value.get("passage").and_then(Value::as_str).map(str::trim).filter(|p| !p.is_empty()).map(str::to_string);
                if passage.is_none() {
                    warn!("hypothetical answer missing from generation output");
                }
                passage
            }
            Err(e) => {
                warn!(error = %e, "hypothetical-answer expansion failed, using original query only");
                None
            }
        }
    }
}

/// Up to `n` distinct non-empty phrasings that differ from the original.
fn parse_phrasings(value: &Value, original: &str, n: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let Some(items) = value.get("queries").and_then(Value::as_array) else {
        warn!("multi-phrasing output has no 'queries' array");
        return out;
    };
    for text in items.iter().filter_map(Value::as_str).map(str::trim) {
        if out.len() == n {
            break;
        }
        if text.is_empty() || text.eq_ignore_ascii_case(original.trim()) || out.iter().any(|o| o.eq_ignore_ascii_case(text)) {
            continue;
        }
        out.push(text.to_string());
    }
    out
}
