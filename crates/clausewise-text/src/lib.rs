//! Tantivy-backed sparse (BM25) index over child fragments.

pub mod index;
pub mod schema;

pub use index::TantivySparseIndex;
