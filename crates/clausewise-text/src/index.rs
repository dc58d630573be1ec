use std::collections::BTreeSet;
use std::fmt::Display;
use std::sync::{Mutex, MutexGuard};

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, ConstScoreQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::debug;

use clausewise_core::error::{Error, Result};
use clausewise_core::traits::SparseIndex;
use clausewise_core::types::{ChildFragment, SearchHit, SourceKind};

use crate::schema::{build_schema, register_tokenizer, FragmentFields};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// BM25 keyword index over child fragments.
///
/// Writes are serialized through one `IndexWriter` and become visible on
/// commit; every search runs against the searcher snapshot current when it
/// started.
pub struct TantivySparseIndex {
	index: Index,
	reader: IndexReader,
	writer: Mutex<IndexWriter>,
	fields: FragmentFields,
}

fn index_err(context: &str, e: impl Display) -> Error {
	Error::Index(format!("{}: {}", context, e))
}

impl TantivySparseIndex {
	pub fn in_memory() -> Result<Self> {
		let (schema, fields) = build_schema();
		let index = Index::create_in_ram(schema);
		register_tokenizer(&index);
		let writer: IndexWriter = index.writer(WRITER_HEAP_BYTES).map_err(|e| index_err("open writer", e))?;
		let reader: IndexReader = index
			.reader_builder()
			.reload_policy(ReloadPolicy::Manual)
			.try_into()
			.map_err(|e| index_err("open reader", e))?;
		Ok(Self { index, reader, writer: Mutex::new(writer), fields })
	}

	fn writer(&self) -> Result<MutexGuard<'_, IndexWriter>> {
		self.writer.lock().map_err(|_| Error::Index("sparse index writer lock poisoned".into()))
	}

	fn commit(&self, writer: &mut IndexWriter) -> Result<()> {
		writer.commit().map_err(|e| index_err("commit", e))?;
		self.reader.reload().map_err(|e| index_err("reload reader", e))
	}

	/// Distinct analyzed terms of `query`, in a stable order.
	fn query_terms(&self, query: &str) -> Result<BTreeSet<String>> {
		let mut analyzer = self.index.tokenizer_for_field(self.fields.text).map_err(|e| index_err("tokenizer", e))?;
		let mut terms = BTreeSet::new();
		let mut stream = analyzer.token_stream(query);
		stream.process(&mut |token| {
			terms.insert(token.text.clone());
		});
		Ok(terms)
	}

	/// Number of fragments visible to searches.
	pub fn len(&self) -> u64 {
		self.reader.searcher().num_docs()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl SparseIndex for TantivySparseIndex {
	fn upsert(&self, fragments: &[ChildFragment]) -> Result<()> {
		if fragments.is_empty() {
			return Ok(());
		}
		let mut writer = self.writer()?;
		for f in fragments {
			writer.delete_term(Term::from_field_text(self.fields.fragment_id, &f.id));
			writer
				.add_document(doc!(
					self.fields.fragment_id => f.id.clone(),
					self.fields.parent_id => f.parent_id.clone(),
					self.fields.document_id => f.document_id.clone(),
					self.fields.text => f.text.clone(),
				))
				.map_err(|e| index_err("add fragment", e))?;
		}
		self.commit(&mut writer)?;
		debug!(fragments = fragments.len(), "sparse upsert committed");
		Ok(())
	}

	fn remove_document(&self, document_id: &str) -> Result<()> {
		let mut writer = self.writer()?;
		writer.delete_term(Term::from_field_text(self.fields.document_id, document_id));
		self.commit(&mut writer)?;
		debug!(document_id, "sparse fragments removed");
		Ok(())
	}

	fn search(&self, query: &str, k: usize, scope: Option<&str>) -> Result<Vec<SearchHit>> {
		let terms = self.query_terms(query)?;
		if k == 0 || terms.is_empty() {
			return Ok(Vec::new());
		}
		let should: Vec<(Occur, Box<dyn Query>)> = terms
			.iter()
			.map(|t| {
				let q: Box<dyn Query> = Box::new(TermQuery::new(Term::from_field_text(self.fields.text, t), IndexRecordOption::WithFreqs));
				(Occur::Should, q)
			})
			.collect();
		let text_query: Box<dyn Query> = Box::new(BooleanQuery::new(should));
		let query: Box<dyn Query> = match scope {
			Some(document_id) => {
				let filter = TermQuery::new(Term::from_field_text(self.fields.document_id, document_id), IndexRecordOption::Basic);
				Box::new(BooleanQuery::new(vec![
					(Occur::Must, text_query),
					(Occur::Must, Box::new(ConstScoreQuery::new(Box::new(filter), 0.0)) as Box<dyn Query>),
				]))
			}
			None => text_query,
		};

		let searcher = self.reader.searcher();
		let top_docs = searcher.search(&query, &TopDocs::with_limit(k)).map_err(|e| index_err("search", e))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr).map_err(|e| index_err("fetch stored fields", e))?;
			let id = doc.get_first(self.fields.fragment_id).and_then(|v| v.as_str()).unwrap_or("").to_string();
			hits.push(SearchHit { id, score, source: SourceKind::Sparse });
		}
		debug!(terms = terms.len(), scoped = scope.is_some(), hits = hits.len(), "sparse search");
		Ok(hits)
	}
}
