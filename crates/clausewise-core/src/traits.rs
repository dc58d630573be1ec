use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};
use crate::types::{ChildFragment, Document, DocumentRecord, ParentFragment, SearchHit};

/// Turns files into [`Document`]s. Format parsing lives behind this seam.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Document>;
}

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `hash:d256`).
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ServiceError>;
}

/// A structured generation call: the service must answer with JSON matching
/// `schema`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Short label used in logs and traces (`classify`, `hyde`, `qa`, ...).
    pub purpose: String,
    pub system: String,
    pub prompt: String,
    pub schema: serde_json::Value,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    fn name(&self) -> &str;
    /// Cheap reachability check used once when choosing a backend.
    async fn probe(&self) -> bool;
    async fn generate(&self, request: &GenerationRequest) -> std::result::Result<serde_json::Value, ServiceError>;
}

#[async_trait]
pub trait RerankService: Send + Sync {
    fn name(&self) -> &str;
    /// One relevance score per text, in input order. Higher is better.
    async fn score(&self, query: &str, texts: &[String]) -> std::result::Result<Vec<f32>, ServiceError>;
}

/// Keyword index over child fragments.
pub trait SparseIndex: Send + Sync {
    /// Insert or replace fragments by id.
    fn upsert(&self, fragments: &[ChildFragment]) -> Result<()>;
    fn remove_document(&self, document_id: &str) -> Result<()>;
    /// Top `k` hits, optionally restricted to one document.
    fn search(&self, query: &str, k: usize, scope: Option<&str>) -> Result<Vec<SearchHit>>;
}

/// Nearest-neighbour index over child fragment embeddings.
pub trait DenseIndex: Send + Sync {
    /// Insert or replace fragments by id; `vectors[i]` belongs to `fragments[i]`.
    fn upsert(&self, fragments: &[ChildFragment], vectors: &[Vec<f32>]) -> Result<()>;
    fn remove_document(&self, document_id: &str) -> Result<()>;
    /// Stored vectors of one document, keyed by fragment id.
    fn vectors(&self, document_id: &str) -> Result<Vec<(String, Vec<f32>)>>;
    fn search(&self, vector: &[f32], k: usize, scope: Option<&str>) -> Result<Vec<SearchHit>>;
}

/// Keyed store for documents and fragments. Never searched, only fetched by id.
pub trait FragmentStore: Send + Sync {
    /// Replace everything stored for `record.id` in one step.
    fn put_document(&self, record: DocumentRecord, parents: Vec<ParentFragment>, children: Vec<ChildFragment>) -> Result<()>;
    fn remove_document(&self, document_id: &str) -> Result<()>;
    fn document(&self, document_id: &str) -> Result<Option<DocumentRecord>>;
    fn parent(&self, parent_id: &str) -> Result<Option<ParentFragment>>;
    fn child(&self, child_id: &str) -> Result<Option<ChildFragment>>;
    /// Every child fragment of a document, in chunking order.
    fn children(&self, document_id: &str) -> Result<Vec<ChildFragment>>;
}
