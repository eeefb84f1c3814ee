//! Per-retriever min-max normalization
//!
//! Raw scores from different retrievers live on unrelated scales (BM25 is
//! unbounded, cosine is in [-1, 1]). Each retriever's list is rescaled to
//! [0, 1] independently, per query, before fusion.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::search::retriever::RawResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub entry_id: String,
    pub retriever: String,
    pub raw_score: f64,
    /// Min-max rescaled score in [0, 1]
    pub norm_score: f64,
    /// 1-based position in the retriever's list
    pub rank: usize,
}

/// Rescale one retriever's results onto [0, 1], preserving order.
///
/// Every candidate maps to 1.0 when all scores are equal. Non-finite raw
/// scores are dropped.
pub fn normalize(results: &[RawResult]) -> Vec<NormalizedResult> {
    let finite: Vec<&RawResult> = results
        .iter()
        .filter(|result| {
            let ok = result.raw_score.is_finite();
            if !ok {
                warn!(
                    retriever = %result.retriever,
                    entry_id = %result.entry_id,
                    raw_score = result.raw_score,
                    "dropping non-finite score"
                );
            }
            ok
        })
        .collect();

    let Some(min) = finite.iter().map(|r| r.raw_score).reduce(f64::min) else {
        return Vec::new();
    };
    let max = finite.iter().map(|r| r.raw_score).fold(min, f64::max);
    let range = max - min;

    finite
        .into_iter()
        .enumerate()
        .map(|(idx, result)| {
            let norm_score = if range > 0.0 {
                ((result.raw_score - min) / range).clamp(0.0, 1.0)
            } else {
                1.0
            };
            NormalizedResult {
                entry_id: result.entry_id.clone(),
                retriever: result.retriever.clone(),
                raw_score: result.raw_score,
                norm_score,
                rank: idx + 1,
            }
        })
        .collect()
}
