use std::sync::Arc;

use normativa::config::Config;
use normativa::corpus::InMemoryCorpus;
use normativa::search::{Retriever, SearchEngine};
use normativa::test_utils::fixtures::directive_corpus;

/// Defaults with the cache off, so every call exercises the pipeline.
pub fn uncached_config() -> Config {
    let mut config = Config::default();
    config.cache.enabled = false;
    config
}

pub fn corpus() -> Arc<InMemoryCorpus> {
    Arc::new(directive_corpus())
}

/// Engine over the fixture corpus with real BM25, TF-IDF and dense indices.
pub fn indexed_engine(config: Config) -> SearchEngine {
    SearchEngine::from_corpus(config, corpus()).expect("engine over fixture corpus")
}

/// Engine over the fixture corpus with caller-supplied retrievers.
pub fn engine_with(config: Config, retrievers: Vec<Arc<dyn Retriever>>) -> SearchEngine {
    retrievers
        .into_iter()
        .fold(SearchEngine::builder(config).corpus(corpus()), |builder, r| {
            builder.retriever(r)
        })
        .build()
        .expect("engine with stand-in retrievers")
}
