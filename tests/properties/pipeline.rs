use std::collections::{BTreeMap, HashSet};

use proptest::prelude::*;

use normativa::config::BoostConfig;
use normativa::search::{
    AmountBooster, Analyzer, BoostedResult, FusedResult, QueryInput, RetrieverReport, assemble,
};
use normativa::test_utils::fixtures::{directive_corpus, directive_entries};

fn fixture_ids() -> Vec<String> {
    directive_entries().into_iter().map(|entry| entry.id).collect()
}

/// Fused batch over fixture ids plus a few ids the corpus does not know.
fn arb_fused() -> impl Strategy<Value = Vec<FusedResult>> {
    let mut pool = fixture_ids();
    pool.extend(["ghost-1".to_string(), "ghost-2".to_string()]);
    prop::collection::vec((prop::sample::select(pool), 0.0f64..3.0), 0..16).prop_map(
        |pairs| {
            let mut fused: Vec<FusedResult> = pairs
                .into_iter()
                .map(|(entry_id, fused_score)| FusedResult {
                    entry_id,
                    fused_score,
                    contributions: BTreeMap::new(),
                })
                .collect();
            fused.sort_by(|a, b| b.fused_score.total_cmp(&a.fused_score));
            fused
        },
    )
}

/// Queries built from letters that never form a keyword, symbol or number.
fn arb_plain_query() -> impl Strategy<Value = String> {
    "[bcdfg]{3,7}( [bcdfg]{3,7}){0,4}"
}

/// A fused batch alongside a permutation of itself.
fn arb_fused_and_shuffled() -> impl Strategy<Value = (Vec<FusedResult>, Vec<FusedResult>)> {
    arb_fused().prop_flat_map(|fused| (Just(fused.clone()), Just(fused).prop_shuffle()))
}

fn sorted(mut boosted: Vec<BoostedResult>) -> Vec<BoostedResult> {
    boosted.sort_by(|a, b| {
        a.fused
            .entry_id
            .cmp(&b.fused.entry_id)
            .then(a.score.total_cmp(&b.score))
    });
    boosted
}

fn completed_reports() -> Vec<RetrieverReport> {
    vec![RetrieverReport::completed("bm25", 0, 0)]
}

proptest! {
    #[test]
    fn booster_is_identity_without_amount_intent(
        query in arb_plain_query(),
        fused in arb_fused()
    ) {
        let booster = AmountBooster::new(BoostConfig::default());
        let intent = booster.detect(&QueryInput::new(query, &Analyzer::spanish()));
        prop_assert!(!intent.triggered);

        let boosted = booster.apply(&intent, fused.clone(), &directive_corpus());
        prop_assert_eq!(boosted.len(), fused.len());
        for (out, input) in boosted.iter().zip(&fused) {
            prop_assert_eq!(&out.fused, input);
            prop_assert_eq!(out.score, input.fused_score);
            prop_assert!(out.boost.is_none());
        }
    }

    #[test]
    fn boost_is_bounded_and_never_negative(fused in arb_fused()) {
        let config = BoostConfig::default();
        let booster = AmountBooster::new(config.clone());
        let intent = booster.detect(&QueryInput::new("monto de viáticos", &Analyzer::spanish()));
        prop_assert!(intent.triggered);

        let max = fused.iter().map(|f| f.fused_score).fold(0.0, f64::max);
        let boosted = booster.apply(&intent, fused, &directive_corpus());
        for result in &boosted {
            let bonus = result.score - result.fused.fused_score;
            prop_assert!(bonus >= 0.0);
            prop_assert!(bonus <= config.max_bonus_fraction * max + 1e-12);
        }
    }

    #[test]
    fn boost_does_not_depend_on_batch_order(
        (fused, shuffled) in arb_fused_and_shuffled(),
        query in prop::sample::select(vec!["monto de viáticos", "tope de S/ 320.00", "plazo"])
    ) {
        let booster = AmountBooster::new(BoostConfig::default());
        let intent = booster.detect(&QueryInput::new(query, &Analyzer::spanish()));
        let corpus = directive_corpus();

        let in_order = sorted(booster.apply(&intent, fused, &corpus));
        let permuted = sorted(booster.apply(&intent, shuffled, &corpus));
        prop_assert_eq!(in_order, permuted);
    }

    #[test]
    fn assembled_lists_are_ranked_unique_and_bounded(
        fused in arb_fused(),
        k in 1usize..12
    ) {
        let boosted: Vec<BoostedResult> = fused.iter().cloned().map(BoostedResult::unboosted).collect();
        let results = assemble(boosted, k, &directive_corpus(), &completed_reports());

        let distinct: HashSet<&str> = fused.iter().map(|f| f.entry_id.as_str()).collect();
        prop_assert_eq!(results.len(), distinct.len().min(k));

        let ids: HashSet<&str> = results.iter().map(|r| r.entry_id.as_str()).collect();
        prop_assert_eq!(ids.len(), results.len());
        for (idx, result) in results.iter().enumerate() {
            prop_assert_eq!(result.rank, idx + 1);
        }
        for pair in results.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn duplicates_keep_their_best_score(fused in arb_fused()) {
        let boosted: Vec<BoostedResult> = fused.iter().cloned().map(BoostedResult::unboosted).collect();
        let results = assemble(boosted, usize::MAX, &directive_corpus(), &completed_reports());
        for result in &results {
            let best = fused
                .iter()
                .filter(|f| f.entry_id == result.entry_id)
                .map(|f| f.fused_score)
                .fold(f64::MIN, f64::max);
            prop_assert_eq!(result.score, best);
        }
    }
}
