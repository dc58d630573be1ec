//! The task state machine and the facade that wires every component.
//!
//! A task walks `Classify -> Retrieve -> Route -> Execute -> Explain -> Done`.
//! Each state owns the data it needs, so a state cannot be entered without
//! what the previous one produced. Any error ends the walk with a
//! [`TaskFailure`] carrying the trace recorded so far.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use clausewise_core::chunker::Chunker;
use clausewise_core::config::{ConfidenceWeights, Settings};
use clausewise_core::error::{Error, Result};
use clausewise_core::traits::{DenseIndex, EmbeddingService, FragmentStore, RerankService, SparseIndex};
use clausewise_core::types::{Document, DocumentRecord, FragmentCounts, Task, TaskType};
use clausewise_hybrid::{ContextResolver, DualIndexer, HybridRetriever, QueryExpander, Reranker, RetrievalPipeline, RetrievalReport};
use clausewise_llm::{BackendStats, Clock, RetryPolicy, SelectedBackend, ServiceGuard, SlidingWindowLimiter};

use crate::agents::{QaAgent, RiskAgent, StructuredGenerator, SummaryAgent};
use crate::classifier::TaskClassifier;
use crate::explain::{self, SourceRef, StepTimer, TraceEntry};
use crate::response::{AgentPayload, AgentResponse, RetrievalSummary, TaskFailure};

/// Retrieval query used when a risk analysis has no question.
pub const RISK_PROBE: &str = "What are the potential risks, liabilities, and problematic clauses?";
/// Retrieval query used when a summary has no question.
pub const SUMMARY_PROBE: &str = "What are the key terms, parties, and obligations?";

/// Everything the engine talks to. All of it is injected.
pub struct EngineHandles {
    pub sparse: Arc<dyn SparseIndex>,
    pub dense: Arc<dyn DenseIndex>,
    pub store: Arc<dyn FragmentStore>,
    pub embedder: Arc<dyn EmbeddingService>,
    pub backend: SelectedBackend,
    pub reranker: Option<Arc<dyn RerankService>>,
    pub clock: Arc<dyn Clock>,
}

pub struct Engine {
    chunker: Chunker,
    indexer: DualIndexer,
    pipeline: RetrievalPipeline,
    store: Arc<dyn FragmentStore>,
    classifier: TaskClassifier,
    risk: RiskAgent,
    qa: QaAgent,
    summary: SummaryAgent,
    weights: ConfidenceWeights,
    backend: SelectedBackend,
    limiter: Arc<SlidingWindowLimiter>,
}

struct Request<'a> {
    document_id: &'a str,
    task_type: Option<TaskType>,
    query: Option<String>,
}

struct Executed {
    task: Task,
    report: RetrievalReport,
    payload: AgentPayload,
}

struct Explained {
    task: Task,
    report: RetrievalReport,
    payload: AgentPayload,
    sources: Vec<SourceRef>,
    confidence: f32,
}

enum State {
    Classify,
    Retrieve(Task),
    Route(Task, RetrievalReport),
    Execute(Task, RetrievalReport),
    Explain(Box<Executed>),
    Done(Box<Explained>),
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Classify => f.write_str("Classify"),
            State::Retrieve(_) => f.write_str("Retrieve"),
            State::Route(..) => f.write_str("Route"),
            State::Execute(task, _) => write!(f, "Execute({})", task.task_type()),
            State::Explain(_) => f.write_str("Explain"),
            State::Done(_) => f.write_str("Done"),
        }
    }
}

impl Engine {
    pub fn new(settings: &Settings, handles: EngineHandles) -> Result<Self> {
        settings.validate()?;
        let EngineHandles { sparse, dense, store, embedder, backend, reranker, clock } = handles;

        let limiter = Arc::new(SlidingWindowLimiter::from_config(&settings.rate_limit, clock.clone()));
        let policy = RetryPolicy::from(&settings.retry);
        let limited = ServiceGuard::new(policy.clone(), clock.clone()).with_limiter(limiter.clone());
        let rerank_guard = ServiceGuard::new(policy, clock);

        let indexer = DualIndexer::new(
            sparse.clone(),
            dense.clone(),
            store.clone(),
            embedder.clone(),
            limited.clone(),
            settings.indexing.embed_batch_size,
        );
        let pipeline = RetrievalPipeline::new(
            QueryExpander::new(Some(backend.service.clone()), limited.clone(), settings.expansion.clone()),
            HybridRetriever::new(sparse, dense, embedder, limited.clone(), settings.retrieval.clone()),
            Reranker::new(reranker, store.clone(), rerank_guard, settings.rerank.enabled),
            ContextResolver::new(store.clone()),
        );
        let generator = StructuredGenerator::new(backend.service.clone(), limited);

        Ok(Self {
            chunker: Chunker::new(settings.chunking.clone())?,
            indexer,
            pipeline,
            store,
            classifier: TaskClassifier::new(generator.clone()),
            risk: RiskAgent::new(generator.clone()),
            qa: QaAgent::new(generator.clone()),
            summary: SummaryAgent::new(generator),
            weights: settings.confidence.clone(),
            backend,
            limiter,
        })
    }

    /// Chunk and index a document, replacing any earlier version of it.
    pub async fn ingest(&self, document: &Document) -> Result<FragmentCounts> {
        let chunked = self.chunker.chunk(document);
        let counts = self.indexer.index(document, &chunked).await?;
        info!(
            document = %counts.filename,
            document_id = %counts.document_id,
            parents = counts.parents,
            children = counts.children,
            status = ?counts.status,
            "document ingested"
        );
        Ok(counts)
    }

    pub fn document(&self, document_id: &str) -> Result<Option<DocumentRecord>> {
        self.store.document(document_id)
    }

    pub fn stats(&self) -> BackendStats {
        BackendStats {
            active_backend: self.backend.name().to_string(),
            is_fallback: self.backend.is_fallback,
            admitted_requests: self.limiter.admitted(),
        }
    }

    pub async fn run_task(&self, document_id: &str, task_type: Option<TaskType>, query: Option<String>) -> std::result::Result<AgentResponse, TaskFailure> {
        let started = Instant::now();
        let request = Request { document_id, task_type, query: query.filter(|q| !q.trim().is_empty()) };
        let mut trace: Vec<TraceEntry> = Vec::new();
        let mut state = State::Classify;

        loop {
            if let State::Done(done) = state {
                let response = self.respond(*done, trace, started);
                info!(
                    task_type = %response.task_type,
                    confidence = response.confidence,
                    sources = response.sources.len(),
                    duration_ms = response.total_duration_ms,
                    "task complete"
                );
                return Ok(response);
            }

            let label = state.to_string();
            let timer = StepTimer::start();
            match self.advance(state, &request).await {
                Ok((next, detail)) => {
                    trace.push(timer.finish(label, detail));
                    state = next;
                }
                Err(err) => {
                    warn!(state = %label, error = %err, "task failed");
                    trace.push(timer.finish(label.clone(), format!("failed: {}", err)));
                    return Err(TaskFailure::new(label, &err, trace));
                }
            }
        }
    }

    async fn advance(&self, state: State, request: &Request<'_>) -> Result<(State, String)> {
        match state {
            State::Classify => {
                let task = self.classify(request).await?;
                let detail = match (request.task_type, &request.query) {
                    (Some(t), _) => format!("task type {} given", t),
                    (None, None) => format!("no query, defaulted to {}", task.task_type()),
                    (None, Some(_)) => format!("classified as {}", task.task_type()),
                };
                Ok((State::Retrieve(task), detail))
            }
            State::Retrieve(task) => {
                let query = retrieval_query(&task);
                let report = self.pipeline.run(query, Some(task.document_id())).await?;
                let detail = format!(
                    "{} variants, {} candidates, {} contexts",
                    report.variants.len(),
                    report.candidates.len(),
                    report.contexts.len()
                );
                Ok((State::Route(task, report), detail))
            }
            State::Route(task, report) => {
                let detail = format!("routed to {} agent", task.task_type());
                Ok((State::Execute(task, report), detail))
            }
            State::Execute(task, report) => {
                let contexts = &report.contexts;
                let (payload, detail) = match &task {
                    Task::RiskAnalysis { query, .. } => {
                        let out = self.risk.analyze(query.as_deref(), contexts).await?;
                        let detail = format!("{} risks identified", out.total_risks);
                        (AgentPayload::Risk(out), detail)
                    }
                    Task::Qa { question, .. } => {
                        let out = self.qa.answer(question, contexts).await?;
                        let detail = format!("answered with {} citations", out.citations.len());
                        (AgentPayload::Qa(out), detail)
                    }
                    Task::Summary { query, .. } => {
                        let out = self.summary.summarize(query.as_deref(), contexts).await?;
                        let detail = format!("{} key points", out.key_points.len());
                        (AgentPayload::Summary(out), detail)
                    }
                };
                Ok((State::Explain(Box::new(Executed { task, report, payload })), detail))
            }
            State::Explain(executed) => {
                let Executed { task, report, payload } = *executed;
                let scores: Vec<f32> = report.contexts.iter().map(|c| c.score).collect();
                let confidence = explain::confidence(&scores, payload.self_reported_confidence(), &self.weights);
                let sources = explain::sources(&report.contexts);
                let detail = format!("{} sources, confidence {:.3}", sources.len(), confidence);
                Ok((State::Done(Box::new(Explained { task, report, payload, sources, confidence })), detail))
            }
            State::Done(done) => Ok((State::Done(done), String::new())),
        }
    }

    /// Unknown documents fail here, before anything is generated.
    async fn classify(&self, request: &Request<'_>) -> Result<Task> {
        if self.store.document(request.document_id)?.is_none() {
            return Err(Error::NotFound(format!("document '{}'", request.document_id)));
        }
        let task_type = match (request.task_type, request.query.as_deref()) {
            (Some(task_type), _) => task_type,
            (None, None) => TaskType::Summary,
            (None, Some(query)) => self.classifier.classify(query).await?,
        };
        Task::new(task_type, request.document_id, request.query.clone())
    }

    fn respond(&self, done: Explained, trace: Vec<TraceEntry>, started: Instant) -> AgentResponse {
        let Explained { task, report, payload, sources, confidence } = done;
        AgentResponse {
            task_type: task.task_type(),
            document_id: task.document_id().to_string(),
            payload,
            sources,
            confidence,
            retrieval: RetrievalSummary::from(&report),
            reasoning: explain::trace_summary(&trace),
            reasoning_trace: trace,
            total_duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

fn retrieval_query(task: &Task) -> &str {
    match task.query() {
        Some(query) => query,
        None => match task.task_type() {
            TaskType::RiskAnalysis => RISK_PROBE,
            TaskType::Summary | TaskType::Qa => SUMMARY_PROBE,
        },
    }
}
