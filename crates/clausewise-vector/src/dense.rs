use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use tracing::debug;

use clausewise_core::error::{Error, Result};
use clausewise_core::traits::DenseIndex;
use clausewise_core::types::{ChildFragment, SearchHit, SourceKind};

#[derive(Debug, Clone)]
struct DenseEntry {
    id: String,
    document_id: String,
    vector: Vec<f32>,
    norm: f32,
}

#[derive(Debug, Default)]
struct Snapshot {
    dim: Option<usize>,
    entries: Vec<DenseEntry>,
}

/// Exact cosine-similarity index held in memory.
///
/// Readers clone the current snapshot `Arc` and search without holding the
/// lock; writers build a new snapshot and swap it in.
#[derive(Debug, Default)]
pub struct MemoryDenseIndex {
    snapshot: RwLock<Arc<Snapshot>>,
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

impl MemoryDenseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Result<Arc<Snapshot>> {
        self.snapshot
            .read()
            .map(|s| Arc::clone(&s))
            .map_err(|_| Error::Index("dense index lock poisoned".into()))
    }

    fn swap(&self, update: impl FnOnce(&Snapshot) -> Result<Snapshot>) -> Result<()> {
        let mut guard = self.snapshot.write().map_err(|_| Error::Index("dense index lock poisoned".into()))?;
        let next = update(&guard)?;
        *guard = Arc::new(next);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.current().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dim(&self) -> Option<usize> {
        self.current().ok().and_then(|s| s.dim)
    }
}

impl DenseIndex for MemoryDenseIndex {
    fn upsert(&self, fragments: &[ChildFragment], vectors: &[Vec<f32>]) -> Result<()> {
        if fragments.len() != vectors.len() {
            return Err(Error::Index(format!("{} fragments but {} vectors", fragments.len(), vectors.len())));
        }
        if fragments.is_empty() {
            return Ok(());
        }
        self.swap(|old| {
            let dim = old.dim.unwrap_or(vectors[0].len());
            if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
                return Err(Error::Index(format!("vector dimension {} does not match index dimension {}", bad.len(), dim)));
            }
            let replaced: HashSet<&str> = fragments.iter().map(|f| f.id.as_str()).collect();
            let mut entries: Vec<DenseEntry> = old
                .entries
                .iter()
                .filter(|e| !replaced.contains(e.id.as_str()))
                .cloned()
                .collect();
            entries.extend(fragments.iter().zip(vectors).map(|(f, v)| DenseEntry {
                id: f.id.clone(),
                document_id: f.document_id.clone(),
                norm: l2_norm(v),
                vector: v.clone(),
            }));
            Ok(Snapshot { dim: Some(dim), entries })
        })?;
        debug!(fragments = fragments.len(), "dense upsert swapped in");
        Ok(())
    }

    fn remove_document(&self, document_id: &str) -> Result<()> {
        self.swap(|old| {
            let entries: Vec<DenseEntry> = old.entries.iter().filter(|e| e.document_id != document_id).cloned().collect();
            let dim = if entries.is_empty() { None } else { old.dim };
            Ok(Snapshot { dim, entries })
        })
    }

    fn vectors(&self, document_id: &str) -> Result<Vec<(String, Vec<f32>)>> {
        Ok(self
            .current()?
            .entries
            .iter()
            .filter(|e| e.document_id == document_id)
            .map(|e| (e.id.clone(), e.vector.clone()))
            .collect())
    }

    fn search(&self, vector: &[f32], k: usize, scope: Option<&str>) -> Result<Vec<SearchHit>> {
        let snapshot = self.current()?;
        if k == 0 || snapshot.entries.is_empty() {
            return Ok(Vec::new());
        }
        if snapshot.dim != Some(vector.len()) {
            return Err(Error::Index(format!("query dimension {} does not match index dimension {:?}", vector.len(), snapshot.dim)));
        }
        let q_norm = l2_norm(vector);
        let mut hits: Vec<SearchHit> = snapshot
            .entries
            .iter()
            .filter(|e| scope.map_or(true, |d| e.document_id == d))
            .map(|e| {
                let dot: f32 = e.vector.iter().zip(vector).map(|(a, b)| a * b).sum();
                let denom = e.norm * q_norm;
                let score = if denom > 0.0 { dot / denom } else { 0.0 };
                SearchHit { id: e.id.clone(), score, source: SourceKind::Dense }
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clausewise_core::types::CharSpan;

    fn frag(doc: &str, id: &str) -> ChildFragment {
        ChildFragment { id: id.into(), parent_id: format!("{}:p0", doc), document_id: doc.into(), text: String::new(), char_span: CharSpan::new(0, 0) }
    }

    #[test]
    fn nearest_first_and_scoped() {
        let index = MemoryDenseIndex::new();
        index
            .upsert(&[frag("a", "a1"), frag("a", "a2"), frag("b", "b1")], &[vec![1.0, 0.0], vec![0.6, 0.8], vec![0.9, 0.1]])
            .unwrap();
        let hits = index.search(&[1.0, 0.0], 10, None).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "b1", "a2"]);
        let scoped = index.search(&[1.0, 0.0], 10, Some("a")).unwrap();
        assert_eq!(scoped.len(), 2);
        assert!(scoped.iter().all(|h| h.id.starts_with('a')));
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        let index = MemoryDenseIndex::new();
        index.upsert(&[frag("a", "a1")], &[vec![1.0, 0.0]]).unwrap();
        assert!(index.upsert(&[frag("a", "a2")], &[vec![1.0, 0.0, 0.0]]).is_err());
        assert!(index.search(&[1.0], 3, None).is_err());
        assert!(index.upsert(&[frag("a", "a3")], &[]).is_err());
    }

    #[test]
    fn upsert_replaces_and_remove_clears() {
        let index = MemoryDenseIndex::new();
        index.upsert(&[frag("a", "a1")], &[vec![1.0, 0.0]]).unwrap();
        index.upsert(&[frag("a", "a1")], &[vec![0.0, 1.0]]).unwrap();
        index.upsert(&[frag("b", "b1")], &[vec![1.0, 0.0]]).unwrap();
        assert_eq!(index.vectors("a").unwrap(), vec![("a1".to_string(), vec![0.0, 1.0])]);
        index.remove_document("b").unwrap();
        assert_eq!(index.len(), 1);
        let hits = index.search(&[0.0, 1.0], 1, None).unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        index.remove_document("a").unwrap();
        assert!(index.is_empty());
        assert_eq!(index.dim(), None);
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let index = MemoryDenseIndex::new();
        index.upsert(&[frag("a", "a1")], &[vec![1.0, 0.0]]).unwrap();
        let before = index.current().unwrap();
        index.remove_document("a").unwrap();
        assert_eq!(before.entries.len(), 1);
        assert!(index.is_empty());
    }
}
