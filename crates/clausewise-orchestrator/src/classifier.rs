use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use clausewise_core::error::{Error, Result};
use clausewise_core::traits::GenerationRequest;
use clausewise_core::types::TaskType;

use crate::agents::StructuredGenerator;

const SYSTEM: &str = "Classify the user's intent about a legal contract into one of: \
risk_analysis (risks, liabilities, problematic or unfavourable clauses), \
qa (a specific factual question about the contract), \
summary (an overview of the parties, key terms and obligations). \
Respond with JSON: {\"task_type\": \"risk_analysis\" | \"qa\" | \"summary\"}.";

#[derive(Deserialize)]
struct Label {
    task_type: String,
}

/// Maps a free-form request to one of the closed set of task types.
pub struct TaskClassifier {
    generator: StructuredGenerator,
}

impl TaskClassifier {
    pub fn new(generator: StructuredGenerator) -> Self {
        Self { generator }
    }

    pub async fn classify(&self, query: &str) -> Result<TaskType> {
        let request = GenerationRequest {
            purpose: "classify".into(),
            system: SYSTEM.into(),
            prompt: query.to_string(),
            schema: json!({
                "type": "object",
                "properties": {
                    "task_type": { "type": "string", "enum": TaskType::ALL.iter().map(TaskType::as_str).collect::<Vec<_>>() }
                },
                "required": ["task_type"]
            }),
            temperature: 0.0,
            max_tokens: 20,
        };
        let label: Label = self.generator.generate(&request).await.map_err(|e| Error::Classification(e.to_string()))?;
        let task_type = label
            .task_type
            .parse::<TaskType>()
            .map_err(|_| Error::Classification(format!("unrecognized task label '{}'", label.task_type)))?;
        debug!(%task_type, "classified request");
        Ok(task_type)
    }
}
