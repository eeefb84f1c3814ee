//! Rank fusion for hybrid search
//!
//! Merges the normalized lists of every retriever that completed into a
//! single scored candidate set.
//!
//! ## Strategies
//!
//! Weighted sum:
//! ```text
//! F(d) = Σ_r weight_r · norm_r(d)
//! ```
//!
//! Reciprocal Rank Fusion:
//! ```text
//! RRF(d) = Σ_r 1 / (k + rank_r(d))
//! ```
//!
//! Where:
//! - k is a smoothing constant (typically 60)
//! - rank_r(d) is the 1-indexed position of d in retriever r's list
//! - a retriever that did not return d contributes nothing
//!
//! Weights are used as given: never renormalized, and a retriever without a
//! configured weight contributes 0. Inputs are visited in retriever-name
//! order, so the output does not depend on which retriever finished first.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{NormError, Result};
use crate::search::normalize::NormalizedResult;

/// How per-retriever lists are combined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum FusionStrategy {
    Weighted { weights: BTreeMap<String, f64> },
    Rrf { k_rrf: f64 },
}

impl FusionStrategy {
    pub fn rrf(k_rrf: f64) -> Self {
        Self::Rrf { k_rrf }
    }

    pub fn weighted<I, S>(weights: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self::Weighted {
            weights: weights
                .into_iter()
                .map(|(name, weight)| (name.into(), weight))
                .collect(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Weighted { .. } => "weighted",
            Self::Rrf { .. } => "rrf",
        }
    }

    /// Reject parameters that would make scores meaningless.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Rrf { k_rrf } => {
                if !k_rrf.is_finite() || *k_rrf <= 0.0 {
                    return Err(NormError::InvalidRequest(format!(
                        "k_rrf must be a finite value > 0, got {k_rrf}"
                    )));
                }
            }
            Self::Weighted { weights } => {
                if let Some((name, weight)) = weights
                    .iter()
                    .find(|(_, weight)| !weight.is_finite() || **weight < 0.0)
                {
                    return Err(NormError::InvalidRequest(format!(
                        "weight for {name} must be a finite value >= 0, got {weight}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Configured weight for `retriever`; 0 when absent.
    pub fn weight(&self, retriever: &str) -> f64 {
        match self {
            Self::Weighted { weights } => weights.get(retriever).copied().unwrap_or(0.0),
            Self::Rrf { .. } => 1.0,
        }
    }

    /// Bit-exact description of the parameters, for cache keys.
    pub fn fingerprint(&self) -> String {
        match self {
            Self::Weighted { weights } => {
                let parts: Vec<String> = weights
                    .iter()
                    .map(|(name, weight)| format!("{name}={:016x}", weight.to_bits()))
                    .collect();
                format!("weighted[{}]", parts.join(","))
            }
            Self::Rrf { k_rrf } => format!("rrf[{:016x}]", k_rrf.to_bits()),
        }
    }

    fn contribution(&self, retriever: &str, result: &NormalizedResult) -> f64 {
        match self {
            Self::Weighted { .. } => self.weight(retriever) * result.norm_score,
            Self::Rrf { k_rrf } => 1.0 / (k_rrf + result.rank as f64),
        }
    }
}

/// Normalized output of one retriever that completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverRanking {
    pub retriever: String,
    pub results: Vec<NormalizedResult>,
}

impl RetrieverRanking {
    pub fn new(retriever: impl Into<String>, results: Vec<NormalizedResult>) -> Self {
        Self {
            retriever: retriever.into(),
            results,
        }
    }
}

/// What one retriever added to a fused score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub norm_score: f64,
    pub raw_score: f64,
    /// 1-based rank within the retriever's list
    pub rank: usize,
    /// Amount added to the fused score
    pub value: f64,
}

impl Contribution {
    /// Fraction of `total` this contribution accounts for.
    pub fn share_of(&self, total: f64) -> f64 {
        if total > 0.0 { self.value / total } else { 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub entry_id: String,
    pub fused_score: f64,
    /// Keyed by retriever name
    pub contributions: BTreeMap<String, Contribution>,
}

/// Fuse per-retriever lists into one candidate set sorted by fused score.
///
/// Ties keep first-seen order, walking retrievers by name.
pub fn fuse(rankings: &[RetrieverRanking], strategy: &FusionStrategy) -> Result<Vec<FusedResult>> {
    strategy.validate()?;

    let mut ordered: Vec<&RetrieverRanking> = rankings.iter().collect();
    ordered.sort_by(|a, b| a.retriever.cmp(&b.retriever));

    let mut fused: Vec<FusedResult> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for ranking in ordered {
        for result in &ranking.results {
            let value = strategy.contribution(&ranking.retriever, result);
            let contribution = Contribution {
                norm_score: result.norm_score,
                raw_score: result.raw_score,
                rank: result.rank,
                value,
            };

            let idx = *positions.entry(result.entry_id.clone()).or_insert_with(|| {
                fused.push(FusedResult {
                    entry_id: result.entry_id.clone(),
                    fused_score: 0.0,
                    contributions: BTreeMap::new(),
                });
                fused.len() - 1
            });

            let entry = &mut fused[idx];
            // A retriever listing the same entry twice counts once, at its best rank.
            if let Some(existing) = entry.contributions.get(&ranking.retriever) {
                if existing.value >= value {
                    continue;
                }
                entry.fused_score -= existing.value;
            }
            entry.fused_score += value;
            entry.contributions.insert(ranking.retriever.clone(), contribution);
        }
    }

    fused.sort_by(|a, b| b.fused_score.total_cmp(&a.fused_score));
    Ok(fused)
}
