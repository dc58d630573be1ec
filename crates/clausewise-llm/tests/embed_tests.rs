use clausewise_core::traits::EmbeddingService;
use clausewise_llm::HashEmbedder;

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[tokio::test]
async fn hash_embedder_shapes_and_determinism() {
    let embedder = HashEmbedder::new(256);
    let texts = vec!["Termination requires notice.".to_string(), "Termination requires notice.".to_string()];
    let embs = embedder.embed(&texts).await.expect("embed");
    assert_eq!(embs.len(), 2);
    assert_eq!(embs[0].len(), 256);
    assert_eq!(embedder.dim(), 256);
    assert_eq!(embedder.model_id(), "hash:d256");

    let norm: f32 = embs[0].iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    for (a, b) in embs[0].iter().zip(embs[1].iter()) {
        assert!((a - b).abs() <= 1e-6);
    }
}

#[test]
fn shared_vocabulary_is_closer() {
    let embedder = HashEmbedder::new(384);
    let q = embedder.embed_text("What is the termination period?");
    let related = embedder.embed_text("The termination period is sixty days.");
    let unrelated = embedder.embed_text("Invoices are payable in euros.");
    assert!(cosine(&q, &related) > cosine(&q, &unrelated));
}

#[test]
fn punctuation_and_case_do_not_change_tokens() {
    let embedder = HashEmbedder::new(64);
    let a = embedder.embed_text("Termination, NOTICE");
    let b = embedder.embed_text("termination notice");
    assert!((cosine(&a, &b) - 1.0).abs() < 1e-5);
}
