use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use clausewise_core::error::{Error, Result};
use clausewise_core::traits::FragmentStore;
use clausewise_core::types::{ChildFragment, DocumentRecord, ParentFragment};

#[derive(Debug, Default, Clone)]
struct Snapshot {
    documents: HashMap<String, DocumentRecord>,
    parents: HashMap<String, Arc<ParentFragment>>,
    children: HashMap<String, Arc<ChildFragment>>,
}

impl Snapshot {
    fn without(&self, document_id: &str) -> Snapshot {
        let mut next = self.clone();
        next.documents.remove(document_id);
        next.parents.retain(|_, p| p.document_id != document_id);
        next.children.retain(|_, c| c.document_id != document_id);
        next
    }
}

/// Keyed document/parent/child store with copy-on-write snapshots.
///
/// `put_document` swaps in a snapshot that no longer contains anything of the
/// previous version of that document, so readers see either the old or the
/// new version, never a mix.
#[derive(Debug, Default)]
pub struct MemoryFragmentStore {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl MemoryFragmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Result<Arc<Snapshot>> {
        self.snapshot
            .read()
            .map(|s| Arc::clone(&s))
            .map_err(|_| Error::Index("fragment store lock poisoned".into()))
    }

    fn swap(&self, update: impl FnOnce(&Snapshot) -> Snapshot) -> Result<()> {
        let mut guard = self.snapshot.write().map_err(|_| Error::Index("fragment store lock poisoned".into()))?;
        *guard = Arc::new(update(&guard));
        Ok(())
    }
}

impl FragmentStore for MemoryFragmentStore {
    fn put_document(&self, record: DocumentRecord, parents: Vec<ParentFragment>, children: Vec<ChildFragment>) -> Result<()> {
        if let Some(stray) = parents.iter().map(|p| &p.document_id).chain(children.iter().map(|c| &c.document_id)).find(|d| **d != record.id) {
            return Err(Error::Index(format!("fragment of document '{}' stored under '{}'", stray, record.id)));
        }
        let (n_parents, n_children) = (parents.len(), children.len());
        let document_id = record.id.clone();
        self.swap(move |old| {
            let mut next = old.without(&record.id);
            next.parents.extend(parents.into_iter().map(|p| (p.id.clone(), Arc::new(p))));
            next.children.extend(children.into_iter().map(|c| (c.id.clone(), Arc::new(c))));
            next.documents.insert(record.id.clone(), record);
            next
        })?;
        debug!(document_id = %document_id, parents = n_parents, children = n_children, "fragment store updated");
        Ok(())
    }

    fn remove_document(&self, document_id: &str) -> Result<()> {
        self.swap(|old| old.without(document_id))
    }

    fn document(&self, document_id: &str) -> Result<Option<DocumentRecord>> {
        Ok(self.current()?.documents.get(document_id).cloned())
    }

    fn parent(&self, parent_id: &str) -> Result<Option<ParentFragment>> {
        Ok(self.current()?.parents.get(parent_id).map(|p| p.as_ref().clone()))
    }

    fn child(&self, child_id: &str) -> Result<Option<ChildFragment>> {
        Ok(self.current()?.children.get(child_id).map(|c| c.as_ref().clone()))
    }

    fn children(&self, document_id: &str) -> Result<Vec<ChildFragment>> {
        let mut children: Vec<ChildFragment> =
            self.current()?.children.values().filter(|c| c.document_id == document_id).map(|c| c.as_ref().clone()).collect();
        children.sort_by(|a, b| (a.char_span.start, &a.id).cmp(&(b.char_span.start, &b.id)));
        Ok(children)
    }
}
