use clausewise_core::traits::SparseIndex;
use clausewise_core::types::{CharSpan, ChildFragment, SourceKind};
use clausewise_text::TantivySparseIndex;

fn fragment(doc: &str, id: &str, text: &str) -> ChildFragment {
    ChildFragment {
        id: format!("{}:{}", doc, id),
        parent_id: format!("{}:p0", doc),
        document_id: doc.to_string(),
        text: text.to_string(),
        char_span: CharSpan::new(0, text.chars().count()),
    }
}

fn seeded() -> TantivySparseIndex {
    let index = TantivySparseIndex::in_memory().expect("index");
    index
        .upsert(&[
            fragment("lease", "c0", "The tenant pays rent monthly to the landlord."),
            fragment("lease", "c1", "Termination of this lease requires sixty days notice."),
            fragment("nda", "c0", "Confidential information must not be disclosed."),
            fragment("nda", "c1", "Termination of the agreement does not end confidentiality."),
        ])
        .expect("upsert");
    index
}

#[test]
fn ranks_matching_fragments() {
    let index = seeded();
    let hits = index.search("termination notice", 10, None).unwrap();
    assert_eq!(hits[0].id, "lease:c1");
    assert!(hits.iter().all(|h| h.source == SourceKind::Sparse));
    assert!(hits.iter().any(|h| h.id == "nda:c1"));
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn scope_restricts_to_one_document() {
    let index = seeded();
    let hits = index.search("termination", 10, Some("nda")).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "nda:c1");
}

#[test]
fn stop_word_only_query_and_zero_k_return_nothing() {
    let index = seeded();
    assert!(index.search("the of and", 10, None).unwrap().is_empty());
    assert!(index.search("termination", 0, None).unwrap().is_empty());
}

#[test]
fn obligation_words_are_indexed() {
    let index = seeded();
    index.upsert(&[fragment("lease", "c2", "The tenant shall not assign this lease.")]).unwrap();

    let hits = index.search("shall not", 10, None).unwrap();
    assert_eq!(hits[0].id, "lease:c2");
    let must = index.search("must", 10, None).unwrap();
    assert_eq!(must.len(), 1);
    assert_eq!(must[0].id, "nda:c0");
}

#[test]
fn upsert_replaces_by_fragment_id() {
    let index = seeded();
    index.upsert(&[fragment("lease", "c0", "Rent escalates yearly.")]).unwrap();
    assert_eq!(index.len(), 4);
    assert!(index.search("landlord", 10, None).unwrap().is_empty());
    assert_eq!(index.search("escalates", 10, None).unwrap()[0].id, "lease:c0");
}

#[test]
fn remove_document_drops_all_its_fragments() {
    let index = seeded();
    index.remove_document("lease").unwrap();
    assert_eq!(index.len(), 2);
    let hits = index.search("termination", 10, None).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "nda:c1");
}
