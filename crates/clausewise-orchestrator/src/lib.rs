//! Task orchestration over the retrieval pipeline: classification, routing to
//! the risk/QA/summary agents, and the explainability metadata attached to
//! every answer.

pub mod agents;
pub mod classifier;
pub mod engine;
pub mod explain;
pub mod response;

pub use agents::{Citation, ContractSummary, QaAnswer, Risk, RiskReport, Severity};
pub use classifier::TaskClassifier;
pub use engine::{Engine, EngineHandles, RISK_PROBE, SUMMARY_PROBE};
pub use explain::{SourceRef, TraceEntry};
pub use response::{AgentPayload, AgentResponse, RetrievalSummary, TaskFailure};
