use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use tracing::{debug, error, info, warn};

use clausewise_core::error::{Error, Result};
use clausewise_core::traits::{DenseIndex, EmbeddingService, FragmentStore, SparseIndex};
use clausewise_core::types::{ChildFragment, ChunkedDocument, Document, DocumentRecord, FragmentCounts, IngestStatus};
use clausewise_llm::ServiceGuard;

/// Writes a chunked document into the sparse index, the dense index and the
/// fragment store under shared fragment ids.
pub struct DualIndexer {
    sparse: Arc<dyn SparseIndex>,
    dense: Arc<dyn DenseIndex>,
    store: Arc<dyn FragmentStore>,
    embedder: Arc<dyn EmbeddingService>,
    guard: ServiceGuard,
    batch_size: usize,
}

impl DualIndexer {
    pub fn new(
        sparse: Arc<dyn SparseIndex>,
        dense: Arc<dyn DenseIndex>,
        store: Arc<dyn FragmentStore>,
        embedder: Arc<dyn EmbeddingService>,
        guard: ServiceGuard,
        batch_size: usize,
    ) -> Self {
        Self { sparse, dense, store, embedder, guard, batch_size: batch_size.max(1) }
    }

    pub async fn index(&self, document: &Document, chunked: &ChunkedDocument) -> Result<FragmentCounts> {
        let counts = |status| FragmentCounts {
            document_id: chunked.document_id.clone(),
            filename: chunked.filename.clone(),
            pages: document.page_count(),
            parents: chunked.parents.len(),
            children: chunked.children.len(),
            status,
        };

        let previous = self.store.document(&chunked.document_id)?;
        if let Some(prev) = &previous {
            if prev.fingerprint == chunked.fingerprint {
                info!(document = %chunked.filename, "document unchanged, skipping re-index");
                return Ok(counts(IngestStatus::Unchanged));
            }
        }

        // all vectors are in hand before anything of the old version is touched
        let vectors = self.embed_children(chunked).await?;
        let backup = if previous.is_some() { Some(self.backup(&chunked.document_id)?) } else { None };

        let record = DocumentRecord {
            id: chunked.document_id.clone(),
            filename: chunked.filename.clone(),
            page_count: document.page_count(),
            parent_count: chunked.parents.len(),
            child_count: chunked.children.len(),
            fingerprint: chunked.fingerprint.clone(),
            ingested_at: Utc::now(),
        };
        if let Err(err) = self.write(chunked, &vectors, record) {
            warn!(document = %chunked.filename, error = %err, "index write failed, restoring previous version");
            self.restore(&chunked.document_id, backup.as_ref());
            return Err(err);
        }

        let status = if previous.is_some() { IngestStatus::Replaced } else { IngestStatus::Indexed };
        info!(
            document = %chunked.filename,
            parents = chunked.parents.len(),
            children = chunked.children.len(),
            ?status,
            "document indexed"
        );
        Ok(counts(status))
    }

    /// Index writes go first and the store record last, so the stored
    /// fingerprint only ever names a version both indexes hold.
    fn write(&self, chunked: &ChunkedDocument, vectors: &[Vec<f32>], record: DocumentRecord) -> Result<()> {
        self.sparse.remove_document(&chunked.document_id)?;
        self.dense.remove_document(&chunked.document_id)?;
        self.sparse.upsert(&chunked.children)?;
        self.dense.upsert(&chunked.children, vectors)?;
        self.store.put_document(record, chunked.parents.clone(), chunked.children.clone())
    }

    /// Children and vectors of the stored version, paired by fragment id.
    fn backup(&self, document_id: &str) -> Result<Backup> {
        let mut vectors: HashMap<String, Vec<f32>> = self.dense.vectors(document_id)?.into_iter().collect();
        let mut backup = Backup::default();
        for child in self.store.children(document_id)? {
            if let Some(v) = vectors.remove(&child.id) {
                backup.children.push(child);
                backup.vectors.push(v);
            }
        }
        Ok(backup)
    }

    /// Put both indexes back to the stored version. If that fails too, the
    /// store record is dropped so the next ingest re-indexes from scratch
    /// instead of matching a fingerprint the indexes no longer hold.
    fn restore(&self, document_id: &str, backup: Option<&Backup>) {
        if let Err(err) = self.reinstate(document_id, backup) {
            error!(document_id, error = %err, "restoring previous version failed, dropping stored record");
            if let Err(err) = self.store.remove_document(document_id) {
                error!(document_id, error = %err, "dropping stored record failed");
            }
        }
    }

    fn reinstate(&self, document_id: &str, backup: Option<&Backup>) -> Result<()> {
        self.sparse.remove_document(document_id)?;
        self.dense.remove_document(document_id)?;
        if let Some(backup) = backup {
            self.sparse.upsert(&backup.children)?;
            self.dense.upsert(&backup.children, &backup.vectors)?;
        }
        Ok(())
    }

    /// Embed child texts in concurrent batches, reassembled in batch order.
    async fn embed_children(&self, chunked: &ChunkedDocument) -> Result<Vec<Vec<f32>>> {
        let batches: Vec<Vec<String>> = chunked.children.chunks(self.batch_size).map(|b| b.iter().map(|c| c.text.clone()).collect()).collect();
        debug!(batches = batches.len(), batch_size = self.batch_size, "embedding children");

        let results = try_join_all(batches.iter().enumerate().map(|(i, batch)| async move {
            let vectors = self
                .guard
                .call("embed", || self.embedder.embed(batch))
                .await
                .map_err(|e| Error::Index(format!("embedding batch {} failed: {}", i, e)))?;
            if vectors.len() != batch.len() {
                return Err(Error::Index(format!("embedding batch {} returned {} vectors for {} texts", i, vectors.len(), batch.len())));
            }
            Ok(vectors)
        }))
        .await?;

        let vectors: Vec<Vec<f32>> = results.into_iter().flatten().collect();
        let dim = self.embedder.dim();
        if dim > 0 {
            if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
                return Err(Error::Index(format!("embedding of dimension {} from {}, expected {}", bad.len(), self.embedder.model_id(), dim)));
            }
        }
        Ok(vectors)
    }
}

#[derive(Default)]
struct Backup {
    children: Vec<ChildFragment>,
    vectors: Vec<Vec<f32>>,
}
