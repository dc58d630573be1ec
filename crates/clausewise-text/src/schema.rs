use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const TOKENIZER: &str = "text_with_stopwords";

/// Handles to the fields of the fragment schema.
#[derive(Debug, Clone, Copy)]
pub struct FragmentFields {
	pub fragment_id: Field,
	pub parent_id: Field,
	pub document_id: Field,
	pub text: Field,
}

pub fn build_schema() -> (Schema, FragmentFields) {
	let mut schema_builder = Schema::builder();
	let fragment_id = schema_builder.add_text_field("fragment_id", STRING | STORED);
	let parent_id = schema_builder.add_text_field("parent_id", STRING | STORED);
	let document_id = schema_builder.add_text_field("document_id", STRING | STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text = schema_builder.add_text_field("text", TextOptions::default().set_indexing_options(text_field_indexing));
	(schema_builder.build(), FragmentFields { fragment_id, parent_id, document_id, text })
}

/// Lowercasing word tokenizer that drops English function words. Modal verbs
/// and `not` stay searchable: "shall not assign" and "may assign" are
/// different clauses.
pub fn register_tokenizer(index: &Index) {
	let stop_words = [
		"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","with","or","but","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","do","does","did","have","had","having",
	];
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(TOKENIZER, tokenizer);
}
