//! Score normalization, linear fusion and multi-variant merging.
//!
//! Everything here is pure: the same inputs give the same ranked output
//! regardless of the order variants finish in.

use std::cmp::Ordering;
use std::collections::HashMap;

use clausewise_core::types::{RetrievalCandidate, SearchHit};

/// Min-max normalize scores to `[0, 1]`. A list whose scores are all equal
/// (including a single hit) normalizes to 1.0.
pub fn min_max_normalize(hits: &[SearchHit]) -> Vec<f32> {
    if hits.is_empty() {
        return Vec::new();
    }
    let min = hits.iter().map(|h| h.score).fold(f32::INFINITY, f32::min);
    let max = hits.iter().map(|h| h.score).fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if range.is_nan() || range <= f32::EPSILON {
        return vec![1.0; hits.len()];
    }
    hits.iter().map(|h| (h.score - min) / range).collect()
}

/// `alpha * dense + (1 - alpha) * sparse`; an absent score counts as 0.
pub fn fused_score(alpha: f32, sparse: Option<f32>, dense: Option<f32>) -> f32 {
    alpha * dense.unwrap_or(0.0) + (1.0 - alpha) * sparse.unwrap_or(0.0)
}

fn rank_order(a: Option<usize>, b: Option<usize>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Fused score descending, then dense rank, sparse rank (absent ranks
/// last) and fragment id.
pub fn ranking_order(a: &RetrievalCandidate, b: &RetrievalCandidate) -> Ordering {
    b.fused_score
        .partial_cmp(&a.fused_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| rank_order(a.dense_rank, b.dense_rank))
        .then_with(|| rank_order(a.sparse_rank, b.sparse_rank))
        .then_with(|| a.fragment_id.cmp(&b.fragment_id))
}

/// Fuse one variant's sparse and dense hit lists into ranked candidates.
/// Hits must be in each index's rank order.
pub fn fuse(sparse: &[SearchHit], dense: &[SearchHit], alpha: f32) -> Vec<RetrievalCandidate> {
    let mut by_id: HashMap<&str, RetrievalCandidate> = HashMap::new();
    let blank = |id: &str| RetrievalCandidate {
        fragment_id: id.to_string(),
        sparse_score: None,
        dense_score: None,
        fused_score: 0.0,
        rerank_score: None,
        sparse_rank: None,
        dense_rank: None,
    };

    for (rank, (hit, norm)) in sparse.iter().zip(min_max_normalize(sparse)).enumerate() {
        let c = by_id.entry(hit.id.as_str()).or_insert_with(|| blank(&hit.id));
        if c.sparse_rank.is_none() {
            c.sparse_score = Some(norm);
            c.sparse_rank = Some(rank);
        }
    }
    for (rank, (hit, norm)) in dense.iter().zip(min_max_normalize(dense)).enumerate() {
        let c = by_id.entry(hit.id.as_str()).or_insert_with(|| blank(&hit.id));
        if c.dense_rank.is_none() {
            c.dense_score = Some(norm);
            c.dense_rank = Some(rank);
        }
    }

    let mut out: Vec<RetrievalCandidate> = by_id
        .into_values()
        .map(|mut c| {
            c.fused_score = fused_score(alpha, c.sparse_score, c.dense_score);
            c
        })
        .collect();
    out.sort_by(ranking_order);
    out
}

/// Union of per-variant candidate lists keeping, for each fragment, the
/// entry with the highest fused score.
pub fn merge_variants<I>(lists: I) -> Vec<RetrievalCandidate>
where
    I: IntoIterator<Item = Vec<RetrievalCandidate>>,
{
    let mut best: HashMap<String, RetrievalCandidate> = HashMap::new();
    for c in lists.into_iter().flatten() {
        match best.get(&c.fragment_id) {
            Some(existing) if ranking_order(&c, existing) != Ordering::Less => {}
            _ => {
                best.insert(c.fragment_id.clone(), c);
            }
        }
    }
    let mut out: Vec<RetrievalCandidate> = best.into_values().collect();
    out.sort_by(ranking_order);
    out
}
