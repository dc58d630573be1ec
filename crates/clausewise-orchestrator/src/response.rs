use serde::{Deserialize, Serialize};
use thiserror::Error;

use clausewise_core::error::{Error as CoreError, ErrorKind};
use clausewise_core::types::TaskType;
use clausewise_hybrid::{RerankMode, RetrievalReport};

use crate::agents::{ContractSummary, QaAnswer, RiskReport};
use crate::explain::{SourceRef, TraceEntry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentPayload {
    Risk(RiskReport),
    Qa(QaAnswer),
    Summary(ContractSummary),
}

impl AgentPayload {
    /// Confidence the model reported for its own output. Only answers carry one.
    pub fn self_reported_confidence(&self) -> Option<f32> {
        match self {
            AgentPayload::Qa(answer) => answer.confidence,
            AgentPayload::Risk(_) | AgentPayload::Summary(_) => None,
        }
    }
}

/// How the context for a response was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSummary {
    pub query: String,
    pub variants: Vec<String>,
    pub total_candidates: usize,
    pub contexts: usize,
    pub rerank: RerankMode,
    pub latency_ms: u64,
}

impl From<&RetrievalReport> for RetrievalSummary {
    fn from(report: &RetrievalReport) -> Self {
        Self {
            query: report.query.clone(),
            variants: report.variants.iter().map(|v| v.text.clone()).collect(),
            total_candidates: report.candidates.len(),
            contexts: report.contexts.len(),
            rerank: report.rerank.clone(),
            latency_ms: report.latency_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub task_type: TaskType,
    pub document_id: String,
    pub payload: AgentPayload,
    pub sources: Vec<SourceRef>,
    pub confidence: f32,
    pub retrieval: RetrievalSummary,
    pub reasoning_trace: Vec<TraceEntry>,
    pub reasoning: String,
    pub total_duration_ms: u64,
}

/// Terminal failure of a task. Never carries a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("task failed during {state}: {message}")]
pub struct TaskFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// State that was running when the task failed.
    pub state: String,
    pub reasoning_trace: Vec<TraceEntry>,
}

impl TaskFailure {
    pub(crate) fn new(state: impl Into<String>, error: &CoreError, reasoning_trace: Vec<TraceEntry>) -> Self {
        Self { kind: error.kind(), message: error.to_string(), state: state.into(), reasoning_trace }
    }
}
