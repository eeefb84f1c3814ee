//! Final result assembly
//!
//! Merges duplicate ids, orders by final score with a deterministic
//! tie-break (corpus position, then id), assigns 1-based ranks, truncates
//! to `k`, and attaches a per-retriever explanation.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::corpus::CorpusLookup;
use crate::search::boost::{AppliedBoost, BoostedResult};
use crate::search::retriever::{RetrieverReport, RetrieverStatus};

/// How one retriever relates to one final result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetrieverContribution {
    /// Returned the entry
    Scored {
        norm_score: f64,
        raw_score: f64,
        rank: usize,
        /// Fraction of the pre-boost fused score
        share: f64,
    },
    /// Ran, but did not return the entry
    Absent,
    /// Did not run to completion for this query
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// Score after fusion, before boosting
    pub fused_score: f64,
    pub retrievers: BTreeMap<String, RetrieverContribution>,
    pub boost_applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boost: Option<AppliedBoost>,
}

impl Explanation {
    /// Names of retrievers that returned this entry.
    pub fn contributing(&self) -> Vec<&str> {
        self.retrievers
            .iter()
            .filter(|(_, c)| matches!(c, RetrieverContribution::Scored { .. }))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub entry_id: String,
    pub score: f64,
    /// 1-based
    pub rank: usize,
    pub explanation: Explanation,
}

impl FinalResult {
    pub fn boost_applied(&self) -> bool {
        self.explanation.boost_applied
    }

    pub fn contributing_retrievers(&self) -> Vec<&str> {
        self.explanation.contributing()
    }
}

/// Merge, order, rank and explain a boosted batch.
pub fn assemble(
    boosted: Vec<BoostedResult>,
    k: usize,
    corpus: &dyn CorpusLookup,
    reports: &[RetrieverReport],
) -> Vec<FinalResult> {
    if boosted.is_empty() || k == 0 {
        return Vec::new();
    }

    let merged = merge_duplicates(boosted);

    let mut keyed: Vec<(usize, BoostedResult)> = merged
        .into_iter()
        .map(|result| {
            let position = corpus.position(&result.fused.entry_id).unwrap_or(usize::MAX);
            (position, result)
        })
        .collect();

    keyed.sort_by(|(pos_a, a), (pos_b, b)| match b.score.total_cmp(&a.score) {
        Ordering::Equal => pos_a
            .cmp(pos_b)
            .then_with(|| a.fused.entry_id.cmp(&b.fused.entry_id)),
        other => other,
    });
    keyed.truncate(k);

    keyed
        .into_iter()
        .enumerate()
        .map(|(idx, (_, result))| FinalResult {
            entry_id: result.fused.entry_id.clone(),
            score: result.score,
            rank: idx + 1,
            explanation: explain(&result, reports),
        })
        .collect()
}

/// Keep one result per id: the higher score wins, contributions are unioned.
fn merge_duplicates(boosted: Vec<BoostedResult>) -> Vec<BoostedResult> {
    let mut merged: Vec<BoostedResult> = Vec::with_capacity(boosted.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for result in boosted {
        let Some(idx) = positions.get(&result.fused.entry_id).copied() else {
            positions.insert(result.fused.entry_id.clone(), merged.len());
            merged.push(result);
            continue;
        };

        let existing = &mut merged[idx];
        let (mut winner, loser) = if result.score > existing.score {
            (result, existing.clone())
        } else {
            (existing.clone(), result)
        };
        for (retriever, contribution) in loser.fused.contributions {
            winner
                .fused
                .contributions
                .entry(retriever)
                .or_insert(contribution);
        }
        *existing = winner;
    }

    merged
}

fn explain(result: &BoostedResult, reports: &[RetrieverReport]) -> Explanation {
    let fused_score = result.fused.fused_score;
    let mut retrievers = BTreeMap::new();

    for report in reports {
        let entry = match &report.status {
            RetrieverStatus::Unavailable { reason } => RetrieverContribution::Unavailable {
                reason: reason.clone(),
            },
            RetrieverStatus::Completed { .. } => match result.fused.contributions.get(&report.name) {
                Some(c) => RetrieverContribution::Scored {
                    norm_score: c.norm_score,
                    raw_score: c.raw_score,
                    rank: c.rank,
                    share: c.share_of(fused_score),
                },
                None => RetrieverContribution::Absent,
            },
        };
        retrievers.insert(report.name.clone(), entry);
    }

    // Contributions from retrievers the caller did not report still show up.
    for (name, c) in &result.fused.contributions {
        retrievers
            .entry(name.clone())
            .or_insert_with(|| RetrieverContribution::Scored {
                norm_score: c.norm_score,
                raw_score: c.raw_score,
                rank: c.rank,
                share: c.share_of(fused_score),
            });
    }

    Explanation {
        fused_score,
        retrievers,
        boost_applied: result.boost.as_ref().is_some_and(|b| b.bonus > 0.0),
        boost: result.boost.clone(),
    }
}
