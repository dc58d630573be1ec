use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use clausewise_core::error::Result;
use clausewise_core::traits::GenerationRequest;
use clausewise_hybrid::ResolvedContext;

use super::{format_context, generation_error, StructuredGenerator};

const SYSTEM: &str = "You are a legal contract analyst. Summarize the contract sections you are given: \
what the agreement is for, who the parties are, and the key terms and obligations of each party. \
Respond with JSON: {\"summary\": \"...\", \"key_points\": [\"...\"], \"parties\": [\"...\"], \"contract_type\": \"...\"}.";

const NO_CONTEXT: &str = "No contract text was available to summarize.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractSummary {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub parties: Vec<String>,
    #[serde(default = "unknown_type")]
    pub contract_type: String,
}

fn unknown_type() -> String {
    "unknown".into()
}

pub struct SummaryAgent {
    generator: StructuredGenerator,
}

impl SummaryAgent {
    pub fn new(generator: StructuredGenerator) -> Self {
        Self { generator }
    }

    pub async fn summarize(&self, focus: Option<&str>, contexts: &[ResolvedContext]) -> Result<ContractSummary> {
        if contexts.is_empty() {
            info!("no context to summarize, skipping generation");
            return Ok(ContractSummary { summary: NO_CONTEXT.into(), key_points: Vec::new(), parties: Vec::new(), contract_type: unknown_type() });
        }

        let mut prompt = format!("Summarize the following contract sections:\n\n{}", format_context(contexts));
        if let Some(focus) = focus {
            prompt.push_str(&format!("\n\nPay particular attention to: {}", focus));
        }
        let request = GenerationRequest {
            purpose: "summary".into(),
            system: SYSTEM.into(),
            prompt,
            schema: json!({
                "type": "object",
                "properties": {
                    "summary": { "type": "string" },
                    "key_points": { "type": "array", "items": { "type": "string" } },
                    "parties": { "type": "array", "items": { "type": "string" } },
                    "contract_type": { "type": "string" }
                },
                "required": ["summary", "key_points"]
            }),
            temperature: 0.2,
            max_tokens: 1500,
        };

        let mut summary: ContractSummary = self.generator.generate(&request).await.map_err(|e| generation_error("summary", e))?;
        summary.key_points.retain(|p| !p.trim().is_empty());
        summary.parties.retain(|p| !p.trim().is_empty());
        Ok(summary)
    }
}
