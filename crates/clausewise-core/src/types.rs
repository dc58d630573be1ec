//! Domain types shared by the chunker, the indexes, retrieval and orchestration.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub type DocumentId = String;
pub type FragmentId = String;

/// Half-open `[start, end)` range measured in chars of the document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharSpan {
    pub start: usize,
    pub end: usize,
}

impl CharSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, other: &CharSpan) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// An ingested contract.
///
/// Fields are private: a document is immutable once constructed. `id` is
/// derived from the filename, so re-ingesting a file addresses the same
/// document and replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    id: DocumentId,
    filename: String,
    full_text: String,
    page_boundaries: Vec<usize>,
}

impl Document {
    /// Build a document from its full text and the char offset at which each
    /// page starts. An empty boundary list means a single page.
    pub fn new(filename: impl Into<String>, full_text: impl Into<String>, page_boundaries: Vec<usize>) -> Result<Self> {
        let filename = filename.into();
        let full_text = full_text.into();
        if full_text.trim().is_empty() {
            return Err(Error::Ingestion(format!("document '{}' has no extractable text", filename)));
        }
        let page_boundaries = if page_boundaries.is_empty() { vec![0] } else { page_boundaries };
        let char_len = full_text.chars().count();
        if page_boundaries[0] != 0 {
            return Err(Error::Ingestion(format!("document '{}': first page must start at offset 0", filename)));
        }
        if page_boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::Ingestion(format!("document '{}': page boundaries must be strictly ascending", filename)));
        }
        if page_boundaries.iter().any(|&b| b > char_len) {
            return Err(Error::Ingestion(format!("document '{}': page boundary beyond end of text", filename)));
        }
        Ok(Self { id: Self::id_for(&filename), filename, full_text, page_boundaries })
    }

    /// Join page texts with a blank line and record where each page begins.
    pub fn from_pages<S: AsRef<str>>(filename: impl Into<String>, pages: &[S]) -> Result<Self> {
        let mut full_text = String::new();
        let mut boundaries = Vec::with_capacity(pages.len());
        let mut offset = 0usize;
        for (i, page) in pages.iter().enumerate() {
            if i > 0 {
                full_text.push_str("\n\n");
                offset += 2;
            }
            boundaries.push(offset);
            full_text.push_str(page.as_ref());
            offset += page.as_ref().chars().count();
        }
        Self::new(filename, full_text, boundaries)
    }

    /// Stable document id for a filename.
    pub fn id_for(filename: &str) -> DocumentId {
        let hash = blake3::hash(filename.as_bytes()).to_hex();
        format!("doc-{}", &hash.as_str()[..16])
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    pub fn page_boundaries(&self) -> &[usize] {
        &self.page_boundaries
    }

    pub fn page_count(&self) -> usize {
        self.page_boundaries.len()
    }

    /// Char span of every page, in order.
    pub fn page_spans(&self) -> Vec<CharSpan> {
        let char_len = self.full_text.chars().count();
        self.page_boundaries
            .iter()
            .enumerate()
            .map(|(i, &start)| {
                let end = self.page_boundaries.get(i + 1).copied().unwrap_or(char_len);
                CharSpan::new(start, end)
            })
            .collect()
    }
}

/// A page-aligned context passage handed to generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentFragment {
    pub id: FragmentId,
    pub document_id: DocumentId,
    pub text: String,
    /// 1-based page the fragment was cut from.
    pub page_number: u32,
    pub char_span: CharSpan,
}

/// A searchable sub-span of exactly one parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildFragment {
    pub id: FragmentId,
    pub parent_id: FragmentId,
    pub document_id: DocumentId,
    pub text: String,
    pub char_span: CharSpan,
}

/// Output of the chunker for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkedDocument {
    pub document_id: DocumentId,
    pub filename: String,
    pub parents: Vec<ParentFragment>,
    pub children: Vec<ChildFragment>,
    /// Hash over text, page boundaries and chunking parameters.
    pub fingerprint: String,
}

impl ChunkedDocument {
    pub fn children_of<'a>(&'a self, parent_id: &'a str) -> impl Iterator<Item = &'a ChildFragment> + 'a {
        self.children.iter().filter(move |c| c.parent_id == parent_id)
    }
}

/// What the fragment store remembers about an ingested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub filename: String,
    pub page_count: usize,
    pub parent_count: usize,
    pub child_count: usize,
    pub fingerprint: String,
    pub ingested_at: DateTime<Utc>,
}

/// What happened to a document on ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Indexed,
    /// A previous version with a different fingerprint was replaced.
    Replaced,
    /// Same fingerprint as the stored version; nothing was re-embedded.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentCounts {
    pub document_id: DocumentId,
    pub filename: String,
    pub pages: usize,
    pub parents: usize,
    pub children: usize,
    pub status: IngestStatus,
}

/// Indicates which index produced a hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Dense,
    Sparse,
}

/// The minimal surface returned by both indexes.
///
/// `id` is a child fragment id. `score` is index-specific but higher is
/// always better.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: FragmentId,
    pub score: f32,
    pub source: SourceKind,
}

/// A fused retrieval result for one child fragment.
///
/// Scores are min-max normalized per source. `None` means the fragment was
/// not returned by that source at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub fragment_id: FragmentId,
    pub sparse_score: Option<f32>,
    pub dense_score: Option<f32>,
    pub fused_score: f32,
    pub rerank_score: Option<f32>,
    pub sparse_rank: Option<usize>,
    pub dense_rank: Option<usize>,
}

impl RetrievalCandidate {
    /// Best available relevance: the rerank score when present.
    pub fn relevance(&self) -> f32 {
        self.rerank_score.unwrap_or(self.fused_score)
    }
}

/// The closed set of tasks the orchestrator can route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    RiskAnalysis,
    Qa,
    Summary,
}

impl TaskType {
    pub const ALL: [TaskType; 3] = [TaskType::RiskAnalysis, TaskType::Qa, TaskType::Summary];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::RiskAnalysis => "risk_analysis",
            TaskType::Qa => "qa",
            TaskType::Summary => "summary",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "risk_analysis" | "risk" => Ok(TaskType::RiskAnalysis),
            "qa" | "question" | "question_answering" => Ok(TaskType::Qa),
            "summary" | "summarize" => Ok(TaskType::Summary),
            other => Err(Error::InvalidRequest(format!("unknown task type '{}'", other))),
        }
    }
}

/// A routed unit of work. QA always carries a question; the other tasks
/// may run without one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task_type", rename_all = "snake_case")]
pub enum Task {
    RiskAnalysis { document_id: DocumentId, query: Option<String> },
    Qa { document_id: DocumentId, question: String },
    Summary { document_id: DocumentId, query: Option<String> },
}

impl Task {
    pub fn new(task_type: TaskType, document_id: impl Into<DocumentId>, query: Option<String>) -> Result<Self> {
        let document_id = document_id.into();
        let query = query.filter(|q| !q.trim().is_empty());
        Ok(match task_type {
            TaskType::RiskAnalysis => Task::RiskAnalysis { document_id, query },
            TaskType::Summary => Task::Summary { document_id, query },
            TaskType::Qa => match query {
                Some(question) => Task::Qa { document_id, question },
                None => return Err(Error::InvalidRequest("a qa task requires a question".into())),
            },
        })
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            Task::RiskAnalysis { .. } => TaskType::RiskAnalysis,
            Task::Qa { .. } => TaskType::Qa,
            Task::Summary { .. } => TaskType::Summary,
        }
    }

    pub fn document_id(&self) -> &str {
        match self {
            Task::RiskAnalysis { document_id, .. } | Task::Qa { document_id, .. } | Task::Summary { document_id, .. } => document_id,
        }
    }

    pub fn query(&self) -> Option<&str> {
        match self {
            Task::RiskAnalysis { query, .. } | Task::Summary { query, .. } => query.as_deref(),
            Task::Qa { question, .. } => Some(question),
        }
    }
}
