use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use clausewise_core::error::Result;
use clausewise_core::traits::GenerationRequest;
use clausewise_hybrid::ResolvedContext;

use super::{format_context, generation_error, locate_page, StructuredGenerator};

const SYSTEM: &str = "You are a legal contract assistant. Answer the question using only the contract sections provided. \
If they do not contain the answer, say so plainly. Quote the supporting text together with its page. \
Rate how well the sections support your answer from 0.0 to 1.0. \
Respond with JSON: {\"answer\": \"...\", \"confidence\": 0.0, \"citations\": [{\"quote\": \"...\", \"page\": 1}]}.";

const NO_CONTEXT: &str = "No relevant information was found in the document to answer this question.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub quote: String,
    #[serde(default)]
    pub page: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaAnswer {
    pub answer: String,
    /// The model's own rating of its answer, when it gave a usable one.
    pub confidence: Option<f32>,
    pub citations: Vec<Citation>,
}

#[derive(Deserialize)]
struct QaReply {
    answer: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    citations: Vec<Citation>,
}

pub struct QaAgent {
    generator: StructuredGenerator,
}

impl QaAgent {
    pub fn new(generator: StructuredGenerator) -> Self {
        Self { generator }
    }

    pub async fn answer(&self, question: &str, contexts: &[ResolvedContext]) -> Result<QaAnswer> {
        if contexts.is_empty() {
            info!("no context for question, skipping generation");
            return Ok(QaAnswer { answer: NO_CONTEXT.into(), confidence: None, citations: Vec::new() });
        }

        let request = GenerationRequest {
            purpose: "qa".into(),
            system: SYSTEM.into(),
            prompt: format!("Contract sections:\n\n{}\n\nQuestion: {}", format_context(contexts), question),
            schema: json!({
                "type": "object",
                "properties": {
                    "answer": { "type": "string" },
                    "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                    "citations": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": { "quote": { "type": "string" }, "page": { "type": "integer" } },
                            "required": ["quote"]
                        }
                    }
                },
                "required": ["answer", "confidence"]
            }),
            temperature: 0.1,
            max_tokens: 1000,
        };

        let reply: QaReply = self.generator.generate(&request).await.map_err(|e| generation_error("qa", e))?;
        let citations = reply
            .citations
            .into_iter()
            .filter(|c| !c.quote.trim().is_empty())
            .map(|mut c| {
                if c.page.is_none() {
                    c.page = locate_page(&c.quote, contexts);
                }
                c
            })
            .collect();
        Ok(QaAnswer {
            answer: reply.answer.trim().to_string(),
            confidence: reply.confidence.filter(|c| c.is_finite()).map(|c| c.clamp(0.0, 1.0)),
            citations,
        })
    }
}
