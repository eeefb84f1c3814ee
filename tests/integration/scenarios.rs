//! End-to-end ranking scenarios over the fixture directives.

use std::sync::Arc;

use normativa::NormError;
use normativa::config::{Bm25Config, Config};
use normativa::search::{
    Analyzer, BM25, Bm25Index, Bm25Retriever, BoostKind, DENSE, DenseIndex, DenseRetriever,
    FusionStrategy, HashEmbedder, Retriever, RetrieverContribution, SearchRequest,
    SearchResponse, TFIDF, TfidfIndex, TfidfRetriever,
};
use normativa::test_utils::TestLogger;
use normativa::test_utils::fixtures::{StaticRetriever, ids};

use super::fixture::{corpus, engine_with, indexed_engine, uncached_config};

fn position(response: &SearchResponse, id: &str) -> Option<usize> {
    response.results.iter().position(|r| r.entry_id == id)
}

fn contribution<'a>(
    response: &'a SearchResponse,
    id: &str,
    retriever: &str,
) -> &'a RetrieverContribution {
    let result = response
        .results
        .iter()
        .find(|r| r.entry_id == id)
        .unwrap_or_else(|| panic!("{id} not in results"));
    &result.explanation.retrievers[retriever]
}

fn bm25_only() -> SearchRequest {
    SearchRequest::new(10, FusionStrategy::weighted([(BM25, 1.0)]))
}

#[test]
fn amount_entry_is_lifted_for_daily_allowance_query() {
    let log = TestLogger::new("amount_entry_is_lifted_for_daily_allowance_query");
    let query = "monto máximo diario de viáticos";

    let boosted = indexed_engine(uncached_config())
        .search_default(query)
        .unwrap();
    let mut plain_config = uncached_config();
    plain_config.boost.enabled = false;
    let plain = indexed_engine(plain_config).search_default(query).unwrap();
    log.log_response(&boosted);
    log.log_response(&plain);

    assert!(boosted.amount_intent.triggered);
    assert!(!plain.amount_intent.triggered);

    let after = position(&boosted, ids::VIATICOS_MONTO).expect("amount entry retrieved");
    let before = position(&plain, ids::VIATICOS_MONTO).expect("amount entry retrieved");
    assert!(after <= before, "boost moved the entry down: {before} -> {after}");

    let hit = &boosted.results[after];
    assert!(hit.boost_applied());
    assert!(hit.score > hit.explanation.fused_score);

    // Fusion is identical with and without the booster
    for result in &boosted.results {
        let unboosted = plain
            .results
            .iter()
            .find(|r| r.entry_id == result.entry_id)
            .expect("same candidate set");
        assert_eq!(result.explanation.fused_score, unboosted.score);
    }
    log.pass();
}

#[test]
fn amount_entry_beats_equally_fused_plain_entry() {
    let engine = engine_with(
        uncached_config(),
        vec![Arc::new(StaticRetriever::new(
            BM25,
            &[(ids::VIATICOS_DEFINICION, 4.0), (ids::VIATICOS_MONTO, 4.0)],
        ))],
    );

    let response = engine.search("monto máximo de viáticos", &bm25_only()).unwrap();
    assert_eq!(response.results[0].entry_id, ids::VIATICOS_MONTO);
    assert_eq!(response.results[1].entry_id, ids::VIATICOS_DEFINICION);
    assert_eq!(response.results[0].explanation.fused_score, 1.0);
    assert_eq!(response.results[1].explanation.fused_score, 1.0);
    assert!(response.results[0].score > response.results[1].score);
    assert!(!response.results[1].boost_applied());

    // Without amount words the corpus order decides the tie
    let response = engine.search("definición de comisión", &bm25_only()).unwrap();
    assert!(!response.amount_intent.triggered);
    assert_eq!(response.results[0].entry_id, ids::VIATICOS_DEFINICION);
    assert_eq!(response.results[0].score, response.results[1].score);
}

#[test]
fn exact_amount_outranks_other_amounts() {
    let engine = engine_with(
        uncached_config(),
        vec![Arc::new(StaticRetriever::new(
            BM25,
            &[(ids::VIATICOS_EXTERIOR, 2.0), (ids::VIATICOS_MONTO, 2.0)],
        ))],
    );

    let response = engine.search("viáticos de S/ 320.00", &bm25_only()).unwrap();
    assert!(response.amount_intent.triggered);
    assert_eq!(response.amount_intent.amounts, vec![32_000]);

    let top = &response.results[0];
    assert_eq!(top.entry_id, ids::VIATICOS_MONTO);
    let boost = top.explanation.boost.as_ref().unwrap();
    assert_eq!(boost.kind, BoostKind::ExactMatch);
    assert!((top.score - 1.2).abs() < 1e-9);

    let other = &response.results[1];
    assert_eq!(other.explanation.boost.as_ref().unwrap().kind, BoostKind::Amount);
    assert!((other.score - 1.1).abs() < 1e-9);
}

#[test]
fn empty_list_is_absent_not_zero() {
    let engine = engine_with(
        uncached_config(),
        vec![
            Arc::new(StaticRetriever::new(
                BM25,
                &[(ids::PASAJES, 3.0), (ids::BIENES, 1.0)],
            )),
            Arc::new(StaticRetriever::new(TFIDF, &[(ids::PASAJES, 0.4)])),
            Arc::new(StaticRetriever::new(DENSE, &[])),
        ],
    );

    let response = engine.search_default("pasajes aéreos").unwrap();
    assert!(!response.is_empty());
    assert!(!response.degraded);
    assert!(response.retrievers.iter().all(|r| r.is_completed()));

    assert_eq!(
        contribution(&response, ids::PASAJES, DENSE),
        &RetrieverContribution::Absent
    );
    assert_eq!(
        contribution(&response, ids::BIENES, TFIDF),
        &RetrieverContribution::Absent
    );
    assert!(matches!(
        contribution(&response, ids::PASAJES, TFIDF),
        RetrieverContribution::Scored { rank: 1, .. }
    ));
    assert_eq!(
        response.results[0].contributing_retrievers(),
        vec![BM25, TFIDF]
    );
}

#[test]
fn all_unavailable_is_an_error() {
    let embedder = Arc::new(HashEmbedder::new(64));
    let retrievers: Vec<Arc<dyn Retriever>> = vec![
        Arc::new(Bm25Retriever::unavailable("index not loaded", Bm25Config::default())),
        Arc::new(TfidfRetriever::unavailable("index not loaded")),
        Arc::new(DenseRetriever::unavailable("index not loaded", embedder, 0.0)),
    ];
    let engine = engine_with(uncached_config(), retrievers);

    match engine.search_default("plazo de rendición de cuentas") {
        Err(NormError::NoRetrieverAvailable { attempted }) => {
            assert_eq!(attempted, vec![BM25, TFIDF, DENSE]);
        }
        other => panic!("expected NoRetrieverAvailable, got {other:?}"),
    }
}

#[test]
fn model_mismatch_degrades_to_lexical() {
    let corpus = corpus();
    let analyzer = Analyzer::spanish();
    let bm25 = Arc::new(Bm25Index::from_corpus(&corpus, &analyzer));
    let tfidf = Arc::new(TfidfIndex::from_corpus(&corpus, &analyzer));
    let entry_ids: Vec<String> = corpus.iter().map(|entry| entry.id.clone()).collect();
    let rows = vec![vec![0.5_f32; 8]; entry_ids.len()];
    let dense = Arc::new(DenseIndex::from_rows(entry_ids, rows, 8, "other-encoder-v2", true).unwrap());

    let engine = normativa::search::SearchEngine::builder(uncached_config())
        .analyzer(analyzer)
        .corpus(corpus)
        .retriever(Arc::new(Bm25Retriever::new(bm25, Bm25Config::default())))
        .retriever(Arc::new(TfidfRetriever::new(tfidf)))
        .retriever(Arc::new(DenseRetriever::new(
            dense,
            Arc::new(HashEmbedder::new(8)),
            0.0,
        )))
        .build()
        .unwrap();

    let response = engine.search_default("rendición de cuentas").unwrap();
    assert!(response.degraded);
    assert_eq!(response.results[0].entry_id, ids::VIATICOS_RENDICION);

    let unavailable: Vec<&str> = response.unavailable().map(|r| r.name.as_str()).collect();
    assert_eq!(unavailable, vec![DENSE]);
    match contribution(&response, ids::VIATICOS_RENDICION, DENSE) {
        RetrieverContribution::Unavailable { reason } => assert!(reason.contains("model")),
        other => panic!("expected unavailable dense, got {other:?}"),
    }
}

#[test]
fn repeated_queries_are_deterministic() {
    let query = "plazo para la rendición de viáticos";
    let parallel = indexed_engine(uncached_config());
    let first = parallel.search_default(query).unwrap();
    for _ in 0..3 {
        assert_eq!(parallel.search_default(query).unwrap().results, first.results);
    }

    let mut sequential_config = uncached_config();
    sequential_config.engine.parallel = false;
    let sequential = indexed_engine(sequential_config);
    assert_eq!(sequential.search_default(query).unwrap().results, first.results);
}

#[test]
fn final_lists_are_ranked_and_unique() {
    let engine = indexed_engine(uncached_config());
    for query in [
        "monto máximo diario de viáticos",
        "pasajes aéreos en clase económica",
        "inventario de bienes",
        "comisión de servicio al exterior US$ 370.00",
    ] {
        for strategy in [Config::default().fusion.strategy(), FusionStrategy::rrf(60.0)] {
            let response = engine
                .search(query, &SearchRequest::new(4, strategy))
                .unwrap();
            assert!(response.results.len() <= 4);
            for (idx, result) in response.results.iter().enumerate() {
                assert_eq!(result.rank, idx + 1);
            }
            for pair in response.results.windows(2) {
                assert!(pair[0].score >= pair[1].score);
                assert_ne!(pair[0].entry_id, pair[1].entry_id);
            }
            let mut ids: Vec<&str> = response.results.iter().map(|r| r.entry_id.as_str()).collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), response.results.len());
        }
    }
}

#[test]
fn whitespace_query_is_empty_not_error() {
    let response = indexed_engine(uncached_config())
        .search_default(" \t ")
        .unwrap();
    assert!(response.is_empty());
    assert!(!response.degraded);
}
