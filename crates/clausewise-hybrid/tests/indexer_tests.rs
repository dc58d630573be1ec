mod common;

use std::sync::Arc;

use clausewise_core::chunker::Chunker;
use clausewise_core::config::ChunkingConfig;
use clausewise_core::error::ErrorKind;
use clausewise_core::traits::{DenseIndex, FragmentStore, SparseIndex};
use clausewise_core::types::{Document, IngestStatus};
use clausewise_text::TantivySparseIndex;

use common::*;

#[tokio::test]
async fn reingesting_unchanged_document_skips_embedding() {
    let h = Harness::new();
    let doc = contract();
    let first = h.ingest(&doc).await;
    assert_eq!(first.status, IngestStatus::Indexed);
    assert_eq!(first.pages, 3);
    let calls = h.embedder.calls();

    let again = h.ingest(&doc).await;
    assert_eq!(again.status, IngestStatus::Unchanged);
    assert_eq!(again.children, first.children);
    assert_eq!(h.embedder.calls(), calls);
    assert_eq!(h.dense.len(), first.children);
}

#[tokio::test]
async fn changed_document_replaces_old_fragments() {
    let h = Harness::new();
    h.ingest(&contract()).await;

    let revised = Document::from_pages("services-agreement.txt", &["Only one page now, about indemnification."]).unwrap();
    let counts = h.ingest(&revised).await;
    assert_eq!(counts.status, IngestStatus::Replaced);
    assert_eq!(counts.parents, 1);

    assert!(h.sparse.search("termination", 10, None).unwrap().is_empty());
    assert_eq!(h.dense.len(), 1);
    assert_eq!(h.store.parent(&format!("{}:p2", revised.id())).unwrap(), None);
    assert_eq!(h.store.document(revised.id()).unwrap().unwrap().parent_count, 1);
}

#[tokio::test]
async fn failed_reingest_leaves_previous_version_intact() {
    let h = Harness::new();
    let original = contract();
    h.ingest(&original).await;
    h.embedder.fail(true);

    let revised = Document::from_pages("services-agreement.txt", &["Replacement text."]).unwrap();
    let chunked = h.chunker.chunk(&revised);
    let err = h.indexer.index(&revised, &chunked).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Index);

    assert_eq!(h.sparse.search("termination", 10, None).unwrap().len(), 2);
    assert_eq!(h.dense.len(), 3);
    assert!(h.store.parent(&format!("{}:p2", original.id())).unwrap().is_some());
}

fn revision() -> Document {
    Document::from_pages("services-agreement.txt", &["Replacement text about indemnification."]).unwrap()
}

#[tokio::test]
async fn failed_dense_write_restores_previous_version() {
    let h = FlakyHarness::new();
    let original = contract();
    h.try_ingest(&original).await.unwrap();
    let fingerprint = h.store.document(original.id()).unwrap().unwrap().fingerprint;

    h.dense.faults.fail_next(1);
    let err = h.try_ingest(&revision()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Index);

    assert_eq!(h.termination_hits(), 2);
    assert!(h.sparse.search("indemnification", 10, None).unwrap().is_empty());
    assert_eq!(h.dense.inner.len(), 3);
    assert_eq!(h.store.document(original.id()).unwrap().unwrap().fingerprint, fingerprint);

    let again = h.try_ingest(&original).await.unwrap();
    assert_eq!(again.status, IngestStatus::Unchanged);
    let replaced = h.try_ingest(&revision()).await.unwrap();
    assert_eq!(replaced.status, IngestStatus::Replaced);
    assert_eq!(h.termination_hits(), 0);
    assert_eq!(h.dense.inner.len(), 1);
}

#[tokio::test]
async fn failed_store_write_restores_previous_version() {
    let h = FlakyHarness::new();
    let original = contract();
    h.try_ingest(&original).await.unwrap();

    h.store.faults.fail_next(1);
    assert!(h.try_ingest(&revision()).await.is_err());

    assert_eq!(h.termination_hits(), 2);
    assert_eq!(h.dense.inner.len(), 3);
    assert_eq!(h.store.document(original.id()).unwrap().unwrap().parent_count, 3);
    assert_eq!(h.store.children(original.id()).unwrap().len(), 3);
}

#[tokio::test]
async fn failed_restore_drops_record_so_next_ingest_reindexes() {
    let h = FlakyHarness::new();
    let original = contract();
    h.try_ingest(&original).await.unwrap();

    // the write and the restore both hit a failing dense index
    h.dense.faults.fail_next(2);
    assert!(h.try_ingest(&revision()).await.is_err());
    assert_eq!(h.store.document(original.id()).unwrap(), None);

    let again = h.try_ingest(&original).await.unwrap();
    assert_eq!(again.status, IngestStatus::Indexed);
    assert_eq!(h.termination_hits(), 2);
    assert_eq!(h.dense.inner.len(), 3);
}

#[tokio::test]
async fn failed_first_ingest_leaves_nothing_behind() {
    let h = FlakyHarness::new();
    h.store.faults.fail_next(1);
    let doc = contract();
    assert!(h.try_ingest(&doc).await.is_err());

    assert_eq!(h.termination_hits(), 0);
    assert!(h.dense.inner.is_empty());
    assert_eq!(h.store.document(doc.id()).unwrap(), None);
}

#[tokio::test]
async fn batches_are_reassembled_in_order() {
    let mut h = Harness::with(Arc::new(TantivySparseIndex::in_memory().unwrap()), Arc::new(SwitchableEmbedder::staggered()), 2);
    h.chunker = Chunker::new(ChunkingConfig { parent_max_chars: 120, child_chars: 40, child_overlap: 8 }).unwrap();

    let text = (0..12).map(|i| format!("Clause {} covers topic{} and obligation{}.", i, i, i)).collect::<Vec<_>>().join("\n\n");
    let doc = Document::from_pages("batched.txt", &[text.as_str()]).unwrap();
    let chunked = h.chunker.chunk(&doc);
    assert!(chunked.children.len() > 4);
    h.indexer.index(&doc, &chunked).await.unwrap();

    for child in &chunked.children {
        let hits = h.dense.search(&h.embedder.vector(&child.text), 1, None).unwrap();
        assert_eq!(hits[0].id, child.id);
    }
}
