//! Explainability: source references, the confidence score and the timed
//! reasoning trace attached to every response.

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clausewise_core::config::ConfidenceWeights;
use clausewise_hybrid::ResolvedContext;

/// Longest excerpt quoted from a parent fragment, in chars.
pub const EXCERPT_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub parent_id: String,
    pub page_number: u32,
    pub relevance: f32,
    pub excerpt: String,
}

pub fn sources(contexts: &[ResolvedContext]) -> Vec<SourceRef> {
    contexts
        .iter()
        .map(|c| SourceRef {
            parent_id: c.parent.id.clone(),
            page_number: c.parent.page_number,
            relevance: round3(c.score),
            excerpt: excerpt(&c.parent.text),
        })
        .collect()
}

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

/// Weighted blend of three signals, each in `[0, 1]`:
///
/// - retrieval: mean context relevance
/// - consistency: `1 - 2 * stddev` of the relevances, so a tight cluster of
///   equally good contexts scores higher than one strong hit among noise
/// - generation: the model's self-reported confidence, when it gave one
///
/// The blend is normalized by the weights of the signals present. Without
/// context the confidence is 0.
pub fn confidence(scores: &[f32], self_reported: Option<f32>, weights: &ConfidenceWeights) -> f32 {
    if scores.is_empty() {
        return 0.0;
    }
    let n = scores.len() as f32;
    let mean = scores.iter().sum::<f32>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / n;
    let retrieval = mean.clamp(0.0, 1.0);
    let consistency = (1.0 - 2.0 * variance.sqrt()).clamp(0.0, 1.0);

    let mut total = weights.retrieval * retrieval + weights.consistency * consistency;
    let mut weight = weights.retrieval + weights.consistency;
    if let Some(generated) = self_reported.filter(|g| g.is_finite()) {
        total += weights.generation * generated.clamp(0.0, 1.0);
        weight += weights.generation;
    }
    if weight <= 0.0 {
        return 0.0;
    }
    round3((total / weight).clamp(0.0, 1.0))
}

fn round3(x: f32) -> f32 {
    (x * 1000.0).round() / 1000.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub state: String,
    pub detail: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}ms)", self.state, self.duration_ms)
    }
}

/// `"Classify (2ms) -> Retrieve (40ms) -> ..."`
pub fn trace_summary(trace: &[TraceEntry]) -> String {
    trace.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> ")
}

pub(crate) struct StepTimer {
    started_at: DateTime<Utc>,
    started: Instant,
}

impl StepTimer {
    pub(crate) fn start() -> Self {
        Self { started_at: Utc::now(), started: Instant::now() }
    }

    pub(crate) fn finish(self, state: impl Into<String>, detail: impl Into<String>) -> TraceEntry {
        TraceEntry {
            state: state.into(),
            detail: detail.into(),
            started_at: self.started_at,
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}
