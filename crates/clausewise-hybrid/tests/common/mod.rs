#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use clausewise_core::chunker::Chunker;
use clausewise_core::config::{ChunkingConfig, ExpansionConfig, RetrievalConfig};
use clausewise_core::error::{Error, Result, ServiceError};
use clausewise_core::traits::{DenseIndex, EmbeddingService, FragmentStore, GenerationRequest, GenerationService, RerankService, SparseIndex};
use clausewise_core::types::{ChildFragment, Document, DocumentRecord, FragmentCounts, ParentFragment, SearchHit};
use clausewise_hybrid::{ContextResolver, DualIndexer, HybridRetriever, QueryExpander, Reranker, RetrievalPipeline};
use clausewise_llm::{HashEmbedder, ManualClock, RetryPolicy, ServiceGuard, TermOverlapScorer};
use clausewise_text::TantivySparseIndex;
use clausewise_vector::{MemoryDenseIndex, MemoryFragmentStore};

pub fn guard() -> ServiceGuard {
    ServiceGuard::new(RetryPolicy::no_retry(), Arc::new(ManualClock::new()))
}

/// Hash embedder that counts calls and can be switched to failing.
pub struct SwitchableEmbedder {
    inner: HashEmbedder,
    pub calls: AtomicUsize,
    pub failing: AtomicBool,
    /// Delay per batch, longest for the first batch seen.
    pub stagger: bool,
}

impl SwitchableEmbedder {
    pub fn new() -> Self {
        Self { inner: HashEmbedder::new(256), calls: AtomicUsize::new(0), failing: AtomicBool::new(false), stagger: false }
    }

    pub fn staggered() -> Self {
        Self { stagger: true, ..Self::new() }
    }

    pub fn fail(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        self.inner.embed_text(text)
    }
}

#[async_trait]
impl EmbeddingService for SwitchableEmbedder {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dim(&self) -> usize {
        self.inner.dim()
    }

    async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ServiceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable("embedding service down".into()));
        }
        if self.stagger {
            tokio::time::sleep(Duration::from_millis(40u64.saturating_sub(n as u64 * 10))).await;
        }
        self.inner.embed(texts).await
    }
}

pub struct BrokenSparse;

impl SparseIndex for BrokenSparse {
    fn upsert(&self, _: &[clausewise_core::types::ChildFragment]) -> Result<()> {
        Ok(())
    }
    fn remove_document(&self, _: &str) -> Result<()> {
        Ok(())
    }
    fn search(&self, _: &str, _: usize, _: Option<&str>) -> Result<Vec<SearchHit>> {
        Err(Error::Index("sparse index offline".into()))
    }
}

/// Counts down write failures; `fail_next(n)` rejects the next `n` writes.
#[derive(Default)]
pub struct WriteFaults(AtomicUsize);

impl WriteFaults {
    pub fn fail_next(&self, n: usize) {
        self.0.store(n, Ordering::SeqCst);
    }

    fn check(&self, what: &str) -> Result<()> {
        let left = self.0.load(Ordering::SeqCst);
        if left == 0 {
            return Ok(());
        }
        self.0.store(left - 1, Ordering::SeqCst);
        Err(Error::Index(format!("{} write rejected", what)))
    }
}

/// Dense index whose upserts can be made to fail.
#[derive(Default)]
pub struct FlakyDense {
    pub inner: MemoryDenseIndex,
    pub faults: WriteFaults,
}

impl DenseIndex for FlakyDense {
    fn upsert(&self, fragments: &[ChildFragment], vectors: &[Vec<f32>]) -> Result<()> {
        self.faults.check("dense")?;
        self.inner.upsert(fragments, vectors)
    }
    fn remove_document(&self, document_id: &str) -> Result<()> {
        self.inner.remove_document(document_id)
    }
    fn vectors(&self, document_id: &str) -> Result<Vec<(String, Vec<f32>)>> {
        self.inner.vectors(document_id)
    }
    fn search(&self, vector: &[f32], k: usize, scope: Option<&str>) -> Result<Vec<SearchHit>> {
        self.inner.search(vector, k, scope)
    }
}

/// Fragment store whose `put_document` can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryFragmentStore,
    pub faults: WriteFaults,
}

impl FragmentStore for FlakyStore {
    fn put_document(&self, record: DocumentRecord, parents: Vec<ParentFragment>, children: Vec<ChildFragment>) -> Result<()> {
        self.faults.check("store")?;
        self.inner.put_document(record, parents, children)
    }
    fn remove_document(&self, document_id: &str) -> Result<()> {
        self.inner.remove_document(document_id)
    }
    fn document(&self, document_id: &str) -> Result<Option<DocumentRecord>> {
        self.inner.document(document_id)
    }
    fn parent(&self, parent_id: &str) -> Result<Option<ParentFragment>> {
        self.inner.parent(parent_id)
    }
    fn child(&self, child_id: &str) -> Result<Option<ChildFragment>> {
        self.inner.child(child_id)
    }
    fn children(&self, document_id: &str) -> Result<Vec<ChildFragment>> {
        self.inner.children(document_id)
    }
}

/// Indexer over a dense index and store that can fail mid-write.
pub struct FlakyHarness {
    pub sparse: Arc<TantivySparseIndex>,
    pub dense: Arc<FlakyDense>,
    pub store: Arc<FlakyStore>,
    pub indexer: DualIndexer,
    pub chunker: Chunker,
}

impl FlakyHarness {
    pub fn new() -> Self {
        let sparse = Arc::new(TantivySparseIndex::in_memory().unwrap());
        let dense = Arc::new(FlakyDense::default());
        let store = Arc::new(FlakyStore::default());
        let indexer = DualIndexer::new(sparse.clone(), dense.clone(), store.clone(), Arc::new(SwitchableEmbedder::new()), guard(), 100);
        Self { sparse, dense, store, indexer, chunker: Chunker::new(ChunkingConfig::default()).unwrap() }
    }

    pub async fn try_ingest(&self, document: &Document) -> Result<FragmentCounts> {
        let chunked = self.chunker.chunk(document);
        self.indexer.index(document, &chunked).await
    }

    pub fn termination_hits(&self) -> usize {
        self.sparse.search("termination", 10, None).unwrap().len()
    }
}

pub enum RerankFault {
    Unavailable,
    WrongLength,
    NotFinite,
}

pub struct FaultyRerank(pub RerankFault);

#[async_trait]
impl RerankService for FaultyRerank {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn score(&self, _: &str, texts: &[String]) -> std::result::Result<Vec<f32>, ServiceError> {
        match self.0 {
            RerankFault::Unavailable => Err(ServiceError::Unavailable("reranker down".into())),
            RerankFault::WrongLength => Ok(vec![1.0; texts.len() + 1]),
            RerankFault::NotFinite => Ok(vec![f32::NAN; texts.len()]),
        }
    }
}

/// Reranker that prefers shorter texts, to make reordering visible.
pub struct ShortestFirst;

#[async_trait]
impl RerankService for ShortestFirst {
    fn name(&self) -> &str {
        "shortest-first"
    }

    async fn score(&self, _: &str, texts: &[String]) -> std::result::Result<Vec<f32>, ServiceError> {
        Ok(texts.iter().map(|t| 1.0 / (1.0 + t.len() as f32)).collect())
    }
}

/// Generator answering from a table keyed by request purpose.
pub struct ScriptedGenerator {
    answers: HashMap<String, Value>,
    pub requests: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(answers: Vec<(&str, Value)>) -> Self {
        Self { answers: answers.into_iter().map(|(k, v)| (k.to_string(), v)).collect(), requests: Mutex::new(Vec::new()) }
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

    async fn generate(&self, request: &GenerationRequest) -> std::result::Result<Value, ServiceError> {
        self.requests.lock().unwrap().push(request.purpose.clone());
        self.answers.get(&request.purpose).cloned().ok_or_else(|| ServiceError::Status { status: 500, body: "no script".into() })
    }
}

pub const CONTRACT_PAGES: [&str; 3] = [
    "SERVICES AGREEMENT\n\nThis Services Agreement is made between Acme Corp and Beta LLC. Beta LLC provides consulting services to Acme Corp.",
    "Fees are payable monthly within thirty days of invoice. Late payments accrue interest. Disputes regarding termination fees go to arbitration.",
    "Termination. Either party may terminate this agreement for convenience. The termination period is sixty days written notice to the other party.",
];

pub fn contract() -> Document {
    Document::from_pages("services-agreement.txt", &CONTRACT_PAGES).unwrap()
}

pub struct Harness {
    pub sparse: Arc<dyn SparseIndex>,
    pub dense: Arc<MemoryDenseIndex>,
    pub store: Arc<MemoryFragmentStore>,
    pub embedder: Arc<SwitchableEmbedder>,
    pub indexer: DualIndexer,
    pub chunker: Chunker,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(Arc::new(TantivySparseIndex::in_memory().unwrap()), Arc::new(SwitchableEmbedder::new()), 100)
    }

    pub fn with(sparse: Arc<dyn SparseIndex>, embedder: Arc<SwitchableEmbedder>, batch_size: usize) -> Self {
        let dense = Arc::new(MemoryDenseIndex::new());
        let store = Arc::new(MemoryFragmentStore::new());
        let indexer = DualIndexer::new(sparse.clone(), dense.clone(), store.clone(), embedder.clone(), guard(), batch_size);
        Self { sparse, dense, store, embedder, indexer, chunker: Chunker::new(ChunkingConfig::default()).unwrap() }
    }

    pub async fn ingest(&self, document: &Document) -> FragmentCounts {
        let chunked = self.chunker.chunk(document);
        self.indexer.index(document, &chunked).await.unwrap()
    }

    pub fn retriever(&self, config: RetrievalConfig) -> HybridRetriever {
        HybridRetriever::new(self.sparse.clone(), self.dense.clone(), self.embedder.clone(), guard(), config)
    }

    pub fn reranker(&self, service: Option<Arc<dyn RerankService>>, enabled: bool) -> Reranker {
        Reranker::new(service, self.store.clone(), guard(), enabled)
    }

    pub fn pipeline(&self, generator: Option<Arc<dyn GenerationService>>, expansion: ExpansionConfig, rerank: Option<Arc<dyn RerankService>>) -> RetrievalPipeline {
        RetrievalPipeline::new(
            QueryExpander::new(generator, guard(), expansion),
            self.retriever(RetrievalConfig::default()),
            self.reranker(rerank, true),
            ContextResolver::new(self.store.clone()),
        )
    }

    pub fn default_pipeline(&self) -> RetrievalPipeline {
        self.pipeline(None, ExpansionConfig::default(), Some(Arc::new(TermOverlapScorer::new())))
    }
}
