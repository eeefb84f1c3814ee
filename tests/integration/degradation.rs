//! Partial failure: timeouts, panics and missing indices.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use normativa::config::Config;
use normativa::search::{
    BM25, DENSE, Retriever, RetrieverContribution, RetrieverStatus, SearchEngine, TFIDF,
};
use normativa::test_utils::fixtures::{
    FailingRetriever, PanickingRetriever, SlowRetriever, StaticRetriever, ids,
};

use super::fixture::{engine_with, uncached_config};

fn tight_timeouts(parallel: bool) -> Config {
    let mut config = uncached_config();
    config.engine.parallel = parallel;
    config.engine.retriever_timeout_ms = 100;
    config.engine.query_timeout_ms = 1_000;
    config
}

fn lexical() -> Vec<Arc<dyn Retriever>> {
    vec![
        Arc::new(StaticRetriever::new(
            BM25,
            &[(ids::VIATICOS_RENDICION, 5.0), (ids::VIATICOS_DEFINICION, 2.0)],
        )),
        Arc::new(StaticRetriever::new(TFIDF, &[(ids::VIATICOS_RENDICION, 0.7)])),
    ]
}

fn reason_for<'a>(response: &'a normativa::search::SearchResponse, name: &str) -> &'a str {
    response
        .retrievers
        .iter()
        .find(|report| report.name == name)
        .and_then(|report| report.unavailable_reason())
        .unwrap_or_else(|| panic!("{name} should be unavailable"))
}

/// Poll until no retriever thread is running; false if `within` elapses first.
fn wait_for_idle(engine: &SearchEngine, within: Duration) -> bool {
    let started = Instant::now();
    while engine.workers_in_flight() > 0 {
        if started.elapsed() > within {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
    true
}

#[test]
fn slow_dense_is_dropped_without_waiting_for_it() {
    let mut retrievers = lexical();
    retrievers.push(Arc::new(
        SlowRetriever::new(DENSE, Duration::from_millis(1_500))
            .with_results(&[(ids::BIENES, 0.9)]),
    ));
    let engine = engine_with(tight_timeouts(true), retrievers);

    let started = Instant::now();
    let response = engine.search_default("plazo de rendición").unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_millis(1_000), "waited {elapsed:?}");
    assert!(response.degraded);
    assert_eq!(reason_for(&response, DENSE), "timed out");
    assert_eq!(response.results[0].entry_id, ids::VIATICOS_RENDICION);
    assert!(response.results.iter().all(|r| r.entry_id != ids::BIENES));
    assert_eq!(
        response.results[0].explanation.retrievers[DENSE],
        RetrieverContribution::Unavailable {
            reason: "timed out".to_string()
        }
    );
}

#[test]
fn slow_retriever_is_reported_in_sequential_mode() {
    let mut retrievers = lexical();
    retrievers.push(Arc::new(SlowRetriever::new(DENSE, Duration::from_millis(250))));
    let engine = engine_with(tight_timeouts(false), retrievers);

    let response = engine.search_default("plazo de rendición").unwrap();
    assert!(response.degraded);
    assert_eq!(reason_for(&response, DENSE), "timed out");
    assert!(!response.is_empty());
}

#[test]
fn panics_are_contained_in_both_modes() {
    for parallel in [true, false] {
        let mut retrievers = lexical();
        retrievers.push(Arc::new(PanickingRetriever::new(DENSE)));
        let engine = engine_with(tight_timeouts(parallel), retrievers);

        let response = engine.search_default("plazo de rendición").unwrap();
        assert!(response.degraded, "parallel={parallel}");
        assert_eq!(reason_for(&response, DENSE), "aborted", "parallel={parallel}");
        assert_eq!(response.results[0].entry_id, ids::VIATICOS_RENDICION);
    }
}

#[test]
fn failing_retriever_keeps_its_reason() {
    let mut retrievers = lexical();
    retrievers.push(Arc::new(FailingRetriever::new(DENSE)));
    let engine = engine_with(uncached_config(), retrievers);

    let response = engine.search_default("plazo de rendición").unwrap();
    let statuses: Vec<&RetrieverStatus> = response.retrievers.iter().map(|r| &r.status).collect();
    assert!(matches!(statuses[0], RetrieverStatus::Completed { returned: 2, .. }));
    assert!(matches!(statuses[1], RetrieverStatus::Completed { returned: 1, .. }));
    assert_eq!(
        statuses[2],
        &RetrieverStatus::Unavailable {
            reason: "index not loaded".to_string()
        }
    );
}

#[test]
fn only_survivor_still_answers() {
    let retrievers: Vec<Arc<dyn Retriever>> = vec![
        Arc::new(FailingRetriever::new(BM25)),
        Arc::new(PanickingRetriever::new(TFIDF)),
        Arc::new(StaticRetriever::new(DENSE, &[(ids::PASAJES, 0.8)])),
    ];
    let engine = engine_with(tight_timeouts(true), retrievers);

    let response = engine.search_default("pasajes").unwrap();
    assert!(response.degraded);
    assert_eq!(response.unavailable().count(), 2);
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].contributing_retrievers(), vec![DENSE]);
}

#[test]
fn timed_out_workers_stop_once_cancelled() {
    let mut config = uncached_config();
    config.engine.retriever_timeout_ms = 10;
    let mut retrievers = lexical();
    retrievers.push(Arc::new(SlowRetriever::new(DENSE, Duration::from_secs(3))));
    let engine = engine_with(config, retrievers);

    for _ in 0..20 {
        let response = engine.search_default("plazo de rendición").unwrap();
        assert_eq!(reason_for(&response, DENSE), "timed out");
    }
    assert!(
        wait_for_idle(&engine, Duration::from_secs(2)),
        "{} workers still running",
        engine.workers_in_flight()
    );
}

#[test]
fn uncooperative_retriever_is_capped_at_max_in_flight() {
    let mut config = uncached_config();
    config.engine.retriever_timeout_ms = 10;
    config.engine.max_in_flight = 2;
    let mut retrievers = lexical();
    retrievers.push(Arc::new(
        SlowRetriever::new(DENSE, Duration::from_millis(600)).ignoring_cancel(),
    ));
    let engine = engine_with(config, retrievers);

    let reasons: Vec<String> = (0..5)
        .map(|_| {
            let response = engine.search_default("plazo de rendición").unwrap();
            assert!(!response.is_empty());
            reason_for(&response, DENSE).to_string()
        })
        .collect();

    assert_eq!(reasons, vec!["timed out", "timed out", "busy", "busy", "busy"]);
    assert!(wait_for_idle(&engine, Duration::from_secs(3)));
}
