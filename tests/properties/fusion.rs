use std::collections::{BTreeMap, HashSet};

use proptest::prelude::*;

use normativa::search::{
    FusionStrategy, NormalizedResult, RawResult, RetrieverRanking, fuse, normalize,
};

const RETRIEVERS: [&str; 3] = ["bm25", "dense", "tfidf"];

fn raw_results(retriever: &str, scores: &[f64]) -> Vec<RawResult> {
    scores
        .iter()
        .enumerate()
        .map(|(idx, &raw_score)| RawResult {
            entry_id: format!("e{idx}"),
            raw_score,
            retriever: retriever.to_string(),
        })
        .collect()
}

/// A retriever's list: distinct ids drawn from a small pool, scores descending.
fn arb_ranking(retriever: &'static str) -> impl Strategy<Value = RetrieverRanking> {
    (
        prop::collection::hash_set(0u8..24, 0..12),
        prop::collection::vec(-50.0f64..50.0, 12),
    )
        .prop_map(move |(ids, mut scores)| {
            scores.sort_by(|a, b| b.total_cmp(a));
            let mut ids: Vec<u8> = ids.into_iter().collect();
            ids.sort_unstable();
            let raw: Vec<RawResult> = ids
                .iter()
                .zip(scores)
                .map(|(id, raw_score)| RawResult {
                    entry_id: format!("doc-{id}"),
                    raw_score,
                    retriever: retriever.to_string(),
                })
                .collect();
            RetrieverRanking::new(retriever, normalize(&raw))
        })
}

fn arb_rankings() -> impl Strategy<Value = Vec<RetrieverRanking>> {
    (arb_ranking("bm25"), arb_ranking("tfidf"), arb_ranking("dense"))
        .prop_map(|(a, b, c)| vec![a, b, c])
}

fn arb_weights() -> impl Strategy<Value = BTreeMap<String, f64>> {
    prop::collection::vec(0.0f64..5.0, 3).prop_map(|values| {
        RETRIEVERS
            .iter()
            .zip(values)
            .map(|(name, weight)| ((*name).to_string(), weight))
            .collect()
    })
}

fn arb_strategy() -> impl Strategy<Value = FusionStrategy> {
    prop_oneof![
        arb_weights().prop_map(|weights| FusionStrategy::Weighted { weights }),
        (1.0f64..200.0).prop_map(FusionStrategy::rrf),
    ]
}

proptest! {
    #[test]
    fn normalization_preserves_order(scores in prop::collection::vec(-1e6f64..1e6, 1..40)) {
        let normalized = normalize(&raw_results("bm25", &scores));
        prop_assert_eq!(normalized.len(), scores.len());

        for (idx, result) in normalized.iter().enumerate() {
            prop_assert_eq!(result.rank, idx + 1);
            prop_assert!((0.0..=1.0).contains(&result.norm_score));
        }
        for i in 0..scores.len() {
            for j in 0..scores.len() {
                if scores[i] > scores[j] {
                    prop_assert!(normalized[i].norm_score >= normalized[j].norm_score);
                }
            }
        }
    }

    #[test]
    fn normalization_spans_unit_interval(scores in prop::collection::vec(-100.0f64..100.0, 2..30)) {
        let normalized = normalize(&raw_results("dense", &scores));
        let max = normalized.iter().map(|r| r.norm_score).fold(f64::MIN, f64::max);
        prop_assert_eq!(max, 1.0);

        let distinct = scores.iter().any(|s| *s != scores[0]);
        let min = normalized.iter().map(|r| r.norm_score).fold(f64::MAX, f64::min);
        prop_assert_eq!(min, if distinct { 0.0 } else { 1.0 });
    }

    #[test]
    fn fused_lists_are_sorted_and_unique(
        rankings in arb_rankings(),
        strategy in arb_strategy()
    ) {
        let fused = fuse(&rankings, &strategy).unwrap();

        let input_ids: HashSet<&str> = rankings
            .iter()
            .flat_map(|r| r.results.iter().map(|n| n.entry_id.as_str()))
            .collect();
        let output_ids: HashSet<&str> = fused.iter().map(|f| f.entry_id.as_str()).collect();
        prop_assert_eq!(output_ids.len(), fused.len());
        prop_assert_eq!(output_ids, input_ids);

        for pair in fused.windows(2) {
            prop_assert!(pair[0].fused_score >= pair[1].fused_score);
        }
        for result in &fused {
            let total: f64 = result.contributions.values().map(|c| c.value).sum();
            prop_assert!((total - result.fused_score).abs() < 1e-9);
        }
    }

    #[test]
    fn rrf_top_document_gets_exact_reciprocal(
        rankings in arb_rankings(),
        k_rrf in 1.0f64..200.0
    ) {
        let fused = fuse(&rankings, &FusionStrategy::rrf(k_rrf)).unwrap();
        for ranking in &rankings {
            let Some(top) = ranking.results.first() else { continue };
            let entry = fused.iter().find(|f| f.entry_id == top.entry_id).unwrap();
            let contribution = &entry.contributions[&ranking.retriever];
            prop_assert_eq!(contribution.rank, 1);
            prop_assert_eq!(contribution.value, 1.0 / (k_rrf + 1.0));
        }
    }

    #[test]
    fn unanimous_top_scores_one_with_unit_weights(
        raw in prop::collection::vec(0.01f64..1.0, 3),
        ids in prop::collection::vec(0u8..50, 3)
    ) {
        let sum: f64 = raw.iter().sum();
        let weights: BTreeMap<String, f64> = RETRIEVERS
            .iter()
            .zip(&raw)
            .map(|(name, w)| ((*name).to_string(), w / sum))
            .collect();

        let rankings: Vec<RetrieverRanking> = RETRIEVERS
            .iter()
            .zip(&ids)
            .map(|(name, other)| {
                RetrieverRanking::new(
                    *name,
                    vec![
                        NormalizedResult {
                            entry_id: "shared".to_string(),
                            retriever: (*name).to_string(),
                            raw_score: 3.0,
                            norm_score: 1.0,
                            rank: 1,
                        },
                        NormalizedResult {
                            entry_id: format!("other-{other}"),
                            retriever: (*name).to_string(),
                            raw_score: 1.0,
                            norm_score: 0.0,
                            rank: 2,
                        },
                    ],
                )
            })
            .collect();

        let fused = fuse(&rankings, &FusionStrategy::Weighted { weights }).unwrap();
        prop_assert_eq!(fused[0].entry_id.as_str(), "shared");
        prop_assert!((fused[0].fused_score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn fusion_is_deterministic(rankings in arb_rankings(), strategy in arb_strategy()) {
        let first = fuse(&rankings, &strategy).unwrap();
        let mut reversed = rankings.clone();
        reversed.reverse();
        prop_assert_eq!(fuse(&rankings, &strategy).unwrap(), first.clone());
        prop_assert_eq!(fuse(&reversed, &strategy).unwrap(), first);
    }
}
