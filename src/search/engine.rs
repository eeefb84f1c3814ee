//! Search orchestration
//!
//! Runs every registered retriever against a query, collects their lists
//! under a deadline, and drives normalization, fusion, boosting and
//! assembly. A retriever that errors, panics or misses its deadline is
//! reported unavailable; the query only fails when none completed.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::config::Config;
use crate::corpus::{CorpusLookup, InMemoryCorpus};
use crate::error::{NormError, Result};
use crate::search::analyzer::Analyzer;
use crate::search::assemble::{FinalResult, assemble};
use crate::search::bm25::{Bm25Index, Bm25Retriever};
use crate::search::boost::{AmountBooster, AmountIntent};
use crate::search::cache::{CacheStats, QueryCache, cache_key};
use crate::search::dense::{DenseIndex, DenseRetriever};
use crate::search::embeddings::build_embedder;
use crate::search::hybrid::{FusionStrategy, RetrieverRanking, fuse};
use crate::search::normalize::normalize;
use crate::search::retriever::{QueryInput, RawResult, Retriever, RetrieverReport};
use crate::search::tfidf::{TfidfIndex, TfidfRetriever};

/// Per-call parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub k: usize,
    pub strategy: FusionStrategy,
}

impl SearchRequest {
    pub fn new(k: usize, strategy: FusionStrategy) -> Self {
        Self { k, strategy }
    }

    /// Request built from the configured default `k` and fusion section.
    pub fn from_config(config: &Config) -> Self {
        Self {
            k: config.engine.default_k,
            strategy: config.fusion.strategy(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(NormError::InvalidRequest("k must be greater than 0".into()));
        }
        self.strategy.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<FinalResult>,
    /// One report per registered retriever, in registration order
    pub retrievers: Vec<RetrieverReport>,
    pub amount_intent: AmountIntent,
    /// At least one retriever was unavailable
    pub degraded: bool,
}

impl SearchResponse {
    fn empty(query: &str) -> Self {
        Self {
            query: query.to_string(),
            results: Vec::new(),
            retrievers: Vec::new(),
            amount_intent: AmountIntent::default(),
            degraded: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn unavailable(&self) -> impl Iterator<Item = &RetrieverReport> {
        self.retrievers.iter().filter(|report| !report.is_completed())
    }
}

enum Outcome {
    Completed {
        results: Vec<RawResult>,
        elapsed: Duration,
    },
    Unavailable {
        reason: String,
    },
}

impl Outcome {
    fn from_result(result: Result<Vec<RawResult>>, elapsed: Duration) -> Self {
        match result {
            Ok(results) => Self::Completed { results, elapsed },
            Err(NormError::RetrieverUnavailable { reason, .. }) => Self::Unavailable { reason },
            Err(NormError::Timeout { .. }) => Self::timed_out(),
            Err(err) => Self::Unavailable {
                reason: err.to_string(),
            },
        }
    }

    fn unavailable(reason: &str) -> Self {
        Self::Unavailable {
            reason: reason.to_string(),
        }
    }

    fn timed_out() -> Self {
        Self::unavailable("timed out")
    }

    fn aborted() -> Self {
        Self::unavailable("aborted")
    }
}

/// One claimed worker slot; released when the worker thread ends, panic or not.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn acquire(running: &Arc<AtomicUsize>, limit: usize) -> Option<Self> {
        running
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
            .ok()?;
        Some(Self(Arc::clone(running)))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct SearchEngine {
    config: Config,
    analyzer: Analyzer,
    retrievers: Vec<Arc<dyn Retriever>>,
    /// Live worker threads per retriever, parallel mode only
    in_flight: Vec<Arc<AtomicUsize>>,
    corpus: Arc<dyn CorpusLookup>,
    booster: AmountBooster,
    cache: Option<QueryCache>,
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("retrievers", &self.retriever_names())
            .field("corpus_len", &self.corpus.len())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl SearchEngine {
    pub fn builder(config: Config) -> SearchEngineBuilder {
        SearchEngineBuilder {
            config,
            analyzer: None,
            corpus: None,
            retrievers: Vec::new(),
        }
    }

    /// Build BM25, TF-IDF and dense indices over an in-memory corpus.
    pub fn from_corpus(config: Config, corpus: Arc<InMemoryCorpus>) -> Result<Self> {
        let analyzer = Analyzer::spanish();
        let started = Instant::now();

        let bm25 = Arc::new(Bm25Index::from_corpus(&corpus, &analyzer));
        let tfidf = Arc::new(TfidfIndex::from_corpus(&corpus, &analyzer));
        let embedder = build_embedder(&config.dense)?;
        let dense = Arc::new(DenseIndex::build(&corpus, embedder.as_ref())?);

        info!(
            entries = corpus.len(),
            vocabulary = tfidf.vocabulary_size(),
            model_id = dense.model_id(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "indices built"
        );

        let bm25_params = config.bm25;
        let min_similarity = config.dense.min_similarity;
        Self::builder(config)
            .analyzer(analyzer)
            .corpus(corpus)
            .retriever(Arc::new(Bm25Retriever::new(bm25, bm25_params)))
            .retriever(Arc::new(TfidfRetriever::new(tfidf)))
            .retriever(Arc::new(DenseRetriever::new(dense, embedder, min_similarity)))
            .build()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn retriever_names(&self) -> Vec<&str> {
        self.retrievers.iter().map(|r| r.name()).collect()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(QueryCache::stats)
    }

    /// Retriever worker threads still running, including ones abandoned at a deadline.
    pub fn workers_in_flight(&self) -> usize {
        self.in_flight
            .iter()
            .map(|running| running.load(Ordering::Acquire))
            .sum()
    }

    /// Search with the configured `k` and fusion strategy.
    pub fn search_default(&self, query: &str) -> Result<SearchResponse> {
        self.search(query, &SearchRequest::from_config(&self.config))
    }

    /// Retrieve, fuse, boost and rank.
    ///
    /// A blank query yields an empty, non-degraded response. `Err` is
    /// returned for invalid requests and when no retriever completed.
    pub fn search(&self, query: &str, request: &SearchRequest) -> Result<SearchResponse> {
        request.validate()?;
        if query.trim().is_empty() {
            return Ok(SearchResponse::empty(query));
        }

        match &self.cache {
            Some(cache) => {
                let key = cache_key(query, request.k, &request.strategy);
                let cached = cache.get_or_compute(&key, || self.execute(query, request))?;
                // Keys are case and whitespace insensitive; echo this caller's text.
                let mut response = cached.as_ref().clone();
                response.query = query.to_string();
                Ok(response)
            }
            None => self.execute(query, request),
        }
    }

    fn execute(&self, query: &str, request: &SearchRequest) -> Result<SearchResponse> {
        let span = info_span!("search", k = request.k, strategy = request.strategy.name());
        let _enter = span.enter();
        let started = Instant::now();

        let input = QueryInput::new(query, &self.analyzer);
        let pool = self.config.engine.candidate_pool.max(request.k);

        let outcomes = if self.config.engine.parallel {
            self.run_parallel(&input, pool)
        } else {
            self.run_sequential(&input, pool)
        };

        let mut reports = Vec::with_capacity(outcomes.len());
        let mut rankings = Vec::new();
        for (retriever, outcome) in self.retrievers.iter().zip(outcomes) {
            let name = retriever.name();
            match outcome {
                Outcome::Completed {
                    mut results,
                    elapsed,
                } => {
                    results.truncate(pool);
                    let elapsed_ms = elapsed.as_millis() as u64;
                    debug!(retriever = name, returned = results.len(), elapsed_ms, "retriever completed");
                    reports.push(RetrieverReport::completed(name, results.len(), elapsed_ms));
                    rankings.push(RetrieverRanking::new(name, normalize(&results)));
                }
                Outcome::Unavailable { reason } => {
                    warn!(retriever = name, %reason, "retriever unavailable");
                    reports.push(RetrieverReport::unavailable(name, reason));
                }
            }
        }

        if rankings.is_empty() {
            return Err(NormError::NoRetrieverAvailable {
                attempted: self.retrievers.iter().map(|r| r.name().to_string()).collect(),
            });
        }

        let fused = fuse(&rankings, &request.strategy)?;
        let intent = self.booster.detect(&input);
        let boosted = self.booster.apply(&intent, fused, self.corpus.as_ref());
        let results = assemble(boosted, request.k, self.corpus.as_ref(), &reports);
        let degraded = reports.iter().any(|report| !report.is_completed());

        info!(
            results = results.len(),
            degraded,
            amount_intent = intent.triggered,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search complete"
        );

        Ok(SearchResponse {
            query: query.to_string(),
            results,
            retrievers: reports,
            amount_intent: intent,
            degraded,
        })
    }

    fn deadline(&self) -> Duration {
        let engine = &self.config.engine;
        engine.retriever_timeout().min(engine.query_timeout())
    }

    /// One thread per retriever; results gathered until the deadline.
    ///
    /// Workers share a cancel token that expires at the deadline, so the
    /// built-in retrievers stop scoring soon after the engine stops waiting.
    /// A retriever with `max_in_flight` workers still running is reported
    /// busy instead of getting another thread.
    fn run_parallel(&self, input: &QueryInput, pool: usize) -> Vec<Outcome> {
        let deadline = Instant::now() + self.deadline();
        let cancel = input.cancel.with_deadline(deadline);
        let input = Arc::new(input.with_cancel(cancel.clone()));
        let limit = self.config.engine.max_in_flight;
        let (tx, rx) = crossbeam_channel::unbounded::<(usize, Outcome)>();
        let mut outcomes: Vec<Option<Outcome>> = self.retrievers.iter().map(|_| None).collect();

        for (idx, (retriever, running)) in self.retrievers.iter().zip(&self.in_flight).enumerate() {
            let Some(slot) = InFlightGuard::acquire(running, limit) else {
                outcomes[idx] = Some(Outcome::unavailable("busy"));
                continue;
            };
            let retriever = Arc::clone(retriever);
            let input = Arc::clone(&input);
            let tx = tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("retriever-{}", retriever.name()))
                .spawn(move || {
                    let _slot = slot;
                    let started = Instant::now();
                    let result =
                        panic::catch_unwind(AssertUnwindSafe(|| retriever.retrieve(&input, pool)));
                    let outcome = match result {
                        Ok(result) => Outcome::from_result(result, started.elapsed()),
                        Err(_) => Outcome::aborted(),
                    };
                    // The receiver is gone once the deadline passed; late results are dropped.
                    let _ = tx.send((idx, outcome));
                });
            if let Err(err) = spawned {
                outcomes[idx] = Some(Outcome::Unavailable {
                    reason: format!("failed to start: {err}"),
                });
            }
        }
        drop(tx);

        let mut pending = outcomes.iter().filter(|o| o.is_none()).count();
        while pending > 0 {
            match rx.recv_deadline(deadline) {
                Ok((idx, outcome)) => {
                    outcomes[idx] = Some(outcome);
                    pending -= 1;
                }
                Err(_) => break,
            }
        }
        cancel.cancel();

        outcomes
            .into_iter()
            .map(|outcome| outcome.unwrap_or_else(Outcome::timed_out))
            .collect()
    }

    /// Retrievers in registration order on the calling thread.
    fn run_sequential(&self, input: &QueryInput, pool: usize) -> Vec<Outcome> {
        let query_deadline = Instant::now() + self.config.engine.query_timeout();
        let retriever_timeout = self.config.engine.retriever_timeout();

        self.retrievers
            .iter()
            .map(|retriever| {
                let started = Instant::now();
                if started >= query_deadline {
                    return Outcome::timed_out();
                }
                let deadline = (started + retriever_timeout).min(query_deadline);
                let scoped = input.with_cancel(input.cancel.with_deadline(deadline));

                let result =
                    panic::catch_unwind(AssertUnwindSafe(|| retriever.retrieve(&scoped, pool)));
                let elapsed = started.elapsed();

                match result {
                    Err(_) => Outcome::aborted(),
                    Ok(_) if Instant::now() > deadline => Outcome::timed_out(),
                    Ok(result) => Outcome::from_result(result, elapsed),
                }
            })
            .collect()
    }
}

pub struct SearchEngineBuilder {
    config: Config,
    analyzer: Option<Analyzer>,
    corpus: Option<Arc<dyn CorpusLookup>>,
    retrievers: Vec<Arc<dyn Retriever>>,
}

impl SearchEngineBuilder {
    /// Analyzer for queries; must match the one the indices were built with.
    #[must_use]
    pub fn analyzer(mut self, analyzer: Analyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    #[must_use]
    pub fn corpus(mut self, corpus: Arc<dyn CorpusLookup>) -> Self {
        self.corpus = Some(corpus);
        self
    }

    #[must_use]
    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retrievers.push(retriever);
        self
    }

    pub fn build(self) -> Result<SearchEngine> {
        self.config.validate()?;

        let corpus = self
            .corpus
            .ok_or_else(|| NormError::MissingConfig("corpus".to_string()))?;
        if self.retrievers.is_empty() {
            return Err(NormError::MissingConfig("at least one retriever".to_string()));
        }

        let mut names = HashSet::new();
        for retriever in &self.retrievers {
            if !names.insert(retriever.name().to_string()) {
                return Err(NormError::Config(format!(
                    "retriever registered twice: {}",
                    retriever.name()
                )));
            }
        }

        let cache = if self.config.cache.enabled {
            NonZeroUsize::new(self.config.cache.capacity).map(QueryCache::new)
        } else {
            None
        };

        Ok(SearchEngine {
            booster: AmountBooster::new(self.config.boost.clone()),
            analyzer: self.analyzer.unwrap_or_default(),
            in_flight: self
                .retrievers
                .iter()
                .map(|_| Arc::new(AtomicUsize::new(0)))
                .collect(),
            retrievers: self.retrievers,
            corpus,
            cache,
            config: self.config,
        })
    }
}
