#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use clausewise_core::config::Settings;
use clausewise_core::error::ServiceError;
use clausewise_core::traits::{FragmentStore, GenerationRequest, GenerationService};
use clausewise_core::types::{Document, DocumentRecord};
use clausewise_llm::{HashEmbedder, ManualClock, SelectedBackend, TermOverlapScorer};
use clausewise_orchestrator::{Engine, EngineHandles};
use clausewise_text::TantivySparseIndex;
use clausewise_vector::{MemoryDenseIndex, MemoryFragmentStore};

pub const QUESTION: &str = "What is the termination period?";

pub const CONTRACT_PAGES: [&str; 3] = [
    "SERVICES AGREEMENT\n\nThis Services Agreement is made between Acme Corp and Beta LLC. Beta LLC provides consulting services to Acme Corp.",
    "Fees are payable monthly within thirty days of invoice. Late payments accrue interest. Disputes regarding termination fees go to arbitration.",
    "Termination. Either party may terminate this agreement for convenience. The termination period is sixty days written notice to the other party.",
];

pub fn contract() -> Document {
    Document::from_pages("services-agreement.txt", &CONTRACT_PAGES).unwrap()
}

#[derive(Clone)]
pub enum Reply {
    Json(Value),
    Fail(ServiceError),
}

/// Generator answering from per-purpose queues. The last reply of a queue
/// repeats; a purpose with no queue fails with a 500.
pub struct ScriptedGenerator {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self { replies: Mutex::new(HashMap::new()), requests: Mutex::new(Vec::new()) }
    }

    pub fn answer(self, purpose: &str, value: Value) -> Self {
        self.reply(purpose, Reply::Json(value))
    }

    pub fn reply(self, purpose: &str, reply: Reply) -> Self {
        self.replies.lock().unwrap().entry(purpose.to_string()).or_default().push_back(reply);
        self
    }

    pub fn purposes(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|r| r.purpose.clone()).collect()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn probe(&self) -> bool {
        true
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Value, ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut replies = self.replies.lock().unwrap();
        let Some(queue) = replies.get_mut(&request.purpose) else {
            return Err(ServiceError::Status { status: 500, body: format!("nothing scripted for {}", request.purpose) });
        };
        let reply = if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() };
        match reply {
            Some(Reply::Json(value)) => Ok(value),
            Some(Reply::Fail(err)) => Err(err),
            None => Err(ServiceError::Malformed("empty script".into())),
        }
    }
}

pub struct Fixture {
    pub engine: Engine,
    pub generator: Arc<ScriptedGenerator>,
    pub store: Arc<MemoryFragmentStore>,
    pub clock: Arc<ManualClock>,
}

impl Fixture {
    pub fn new(generator: ScriptedGenerator) -> Self {
        Self::with_settings(Settings::default(), generator)
    }

    pub fn with_settings(settings: Settings, generator: ScriptedGenerator) -> Self {
        let generator = Arc::new(generator);
        let store = Arc::new(MemoryFragmentStore::new());
        let clock = Arc::new(ManualClock::new());
        let service: Arc<dyn GenerationService> = generator.clone();
        let handles = EngineHandles {
            sparse: Arc::new(TantivySparseIndex::in_memory().unwrap()),
            dense: Arc::new(MemoryDenseIndex::new()),
            store: store.clone(),
            embedder: Arc::new(HashEmbedder::new(256)),
            backend: SelectedBackend { service, is_fallback: false },
            reranker: Some(Arc::new(TermOverlapScorer::new())),
            clock: clock.clone(),
        };
        let engine = Engine::new(&settings, handles).unwrap();
        Self { engine, generator, store, clock }
    }

    /// Register a document that has no fragments in any index.
    pub fn register_empty(&self, filename: &str) -> String {
        let id = Document::id_for(filename);
        let record = DocumentRecord {
            id: id.clone(),
            filename: filename.into(),
            page_count: 1,
            parent_count: 0,
            child_count: 0,
            fingerprint: "empty".into(),
            ingested_at: Utc::now(),
        };
        self.store.put_document(record, Vec::new(), Vec::new()).unwrap();
        id
    }
}
