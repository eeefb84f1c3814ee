//! Query cache behaviour through the engine.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use normativa::config::Config;
use normativa::search::{BM25, CacheStats, DENSE, FusionStrategy, Retriever, SearchRequest};
use normativa::test_utils::fixtures::{FailingRetriever, SlowRetriever, StaticRetriever, ids};

use super::fixture::{engine_with, indexed_engine};

fn cached_config() -> Config {
    let mut config = Config::default();
    config.cache.enabled = true;
    config.cache.capacity = 8;
    config
}

#[test]
fn equivalent_queries_share_an_entry() {
    let engine = indexed_engine(cached_config());

    let first = engine.search_default("plazo de rendición").unwrap();
    let second = engine.search_default("  PLAZO   de rendición ").unwrap();

    assert_eq!(first.results, second.results);
    assert_eq!(second.query, "  PLAZO   de rendición ");
    assert_eq!(engine.cache_stats(), Some(CacheStats { hits: 1, misses: 1 }));
}

#[test]
fn request_parameters_are_part_of_the_key() {
    let engine = indexed_engine(cached_config());
    let query = "pasajes aéreos";

    engine.search(query, &SearchRequest::new(3, FusionStrategy::rrf(60.0))).unwrap();
    engine.search(query, &SearchRequest::new(4, FusionStrategy::rrf(60.0))).unwrap();
    engine.search(query, &SearchRequest::new(3, FusionStrategy::rrf(10.0))).unwrap();
    engine.search(query, &SearchRequest::new(3, FusionStrategy::rrf(60.0))).unwrap();

    assert_eq!(engine.cache_stats(), Some(CacheStats { hits: 1, misses: 3 }));
}

#[test]
fn degraded_responses_are_recomputed() {
    let retrievers: Vec<Arc<dyn Retriever>> = vec![
        Arc::new(StaticRetriever::new(BM25, &[(ids::PASAJES, 1.0)])),
        Arc::new(FailingRetriever::new(DENSE)),
    ];
    let engine = engine_with(cached_config(), retrievers);

    assert!(engine.search_default("pasajes").unwrap().degraded);
    assert!(engine.search_default("pasajes").unwrap().degraded);
    assert_eq!(engine.cache_stats(), Some(CacheStats { hits: 0, misses: 2 }));
}

#[test]
fn concurrent_identical_queries_compute_once() {
    let retrievers: Vec<Arc<dyn Retriever>> = vec![Arc::new(
        SlowRetriever::new(BM25, Duration::from_millis(100))
            .with_results(&[(ids::BIENES, 1.0)]),
    )];
    let engine = Arc::new(engine_with(cached_config(), retrievers));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.search_default("inventario").unwrap())
        })
        .collect();
    let responses: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(responses.iter().all(|r| r.results == responses[0].results));
    assert_eq!(engine.cache_stats(), Some(CacheStats { hits: 3, misses: 1 }));
}

#[test]
fn disabled_cache_reports_no_stats() {
    let mut config = cached_config();
    config.cache.enabled = false;
    let engine = indexed_engine(config);
    engine.search_default("plazo").unwrap();
    assert_eq!(engine.cache_stats(), None);
}
