//! Hybrid retrieval: dual indexing, query expansion, sparse+dense fusion,
//! reranking and parent-context resolution.

pub mod expander;
pub mod fusion;
pub mod indexer;
pub mod pipeline;
pub mod reranker;
pub mod resolver;
pub mod retriever;

pub use expander::{QueryExpander, QueryVariant, VariantKind};
pub use indexer::DualIndexer;
pub use pipeline::{RetrievalPipeline, RetrievalReport};
pub use reranker::{RerankMode, RerankOutcome, Reranker};
pub use resolver::{ContextResolver, ResolvedContext};
pub use retriever::HybridRetriever;
