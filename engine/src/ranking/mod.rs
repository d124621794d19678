//! Result ranking and context assembly
//!
//! Turns raw similarity distances into adjusted scores in [0, 1], orders
//! results best-first, and assembles a deterministic, character-bounded
//! context string for the generation prompt.

use crate::vector::RetrievedDocument;

/// Boost for chunks flagged as step-by-step guidance
const BOOST_STEP_BY_STEP: f64 = 0.10;

/// Boost for chunks from authoritative (official) sources
const BOOST_AUTHORITATIVE: f64 = 0.05;

/// Boost for content younger than [`FRESH_AGE_DAYS`]
const BOOST_FRESH: f64 = 0.02;

/// Content age below which the freshness boost applies
const FRESH_AGE_DAYS: i64 = 30;

/// Minimum leftover budget worth spending on a truncated partial chunk
const MIN_PARTIAL_CHUNK: usize = 100;

/// Marker appended when the final chunk is cut to fit the budget
const TRUNCATION_MARKER: &str = " [truncated]";

/// A retrieved document with its adjusted score and final position.
///
/// Derived per query, never persisted.
#[derive(Debug, Clone)]
pub struct RankedResult {
    /// The underlying retrieved chunk
    pub document: RetrievedDocument,

    /// Score in [0, 1]; higher is better
    pub adjusted_score: f64,

    /// Position after sorting, starting at 1
    pub rank: usize,
}

/// Rescale raw distances into adjusted scores and order best-first.
///
/// `adjusted = min(1.0, (1 - distance) + boosts)`; boosts are independent
/// and additive, and the cap is applied after summing. The sort is stable,
/// so results with equal scores keep their original retrieval order.
pub fn rank(documents: Vec<RetrievedDocument>) -> Vec<RankedResult> {
    let mut results: Vec<RankedResult> = documents
        .into_iter()
        .map(|document| {
            let mut score = 1.0 - document.distance;

            if document.metadata.step_by_step {
                score += BOOST_STEP_BY_STEP;
            }
            if document.metadata.source_type.is_authoritative() {
                score += BOOST_AUTHORITATIVE;
            }
            if matches!(document.metadata.age_days, Some(age) if age < FRESH_AGE_DAYS) {
                score += BOOST_FRESH;
            }

            RankedResult {
                document,
                adjusted_score: score.clamp(0.0, 1.0),
                rank: 0,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.adjusted_score
            .partial_cmp(&a.adjusted_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for (i, result) in results.iter_mut().enumerate() {
        result.rank = i + 1;
    }

    results
}

/// Assemble ranked results into a prompt context bounded by `budget`
/// characters (plus at most the fixed truncation-marker overhead).
///
/// Chunks are appended greedily in rank order, each prefixed with a source
/// marker. When the next full chunk would overflow: if more than
/// [`MIN_PARTIAL_CHUNK`] characters of budget remain, a truncated slice plus
/// marker is appended; otherwise assembly stops without the partial chunk.
pub fn assemble(results: &[RankedResult], budget: usize) -> String {
    let mut blob = String::new();
    let mut consumed = 0usize;

    for result in results {
        let chunk = format!(
            "Source {} ({}):\n{}\n\n",
            result.rank, result.document.metadata.title, result.document.content
        );

        if consumed + chunk.len() <= budget {
            blob.push_str(&chunk);
            consumed += chunk.len();
            continue;
        }

        let remaining = budget.saturating_sub(consumed);
        if remaining > MIN_PARTIAL_CHUNK {
            let cut = floor_char_boundary(&chunk, remaining);
            blob.push_str(&chunk[..cut]);
            blob.push_str(TRUNCATION_MARKER);
        }
        break;
    }

    blob.trim().to_string()
}

/// Largest index ≤ `idx` that falls on a UTF-8 character boundary.
fn floor_char_boundary(s: &str, idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    let mut idx = idx;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
