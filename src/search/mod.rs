//! Hybrid retrieval over regulatory text
//!
//! Three independent retrievers feed a normalize → fuse → boost → assemble
//! pipeline driven by [`SearchEngine`].
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                 Query  (Analyzer → QueryInput)                 │
//! └────────────────────────────────────────────────────────────────┘
//!            │                     │                     │
//!            ▼                     ▼                     ▼
//! ┌────────────────────┐ ┌────────────────────┐ ┌────────────────────┐
//! │   Bm25Retriever    │ │   TfidfRetriever   │ │   DenseRetriever   │
//! │   (bm25.rs)        │ │   (tfidf.rs)       │ │   (dense.rs)       │
//! └────────────────────┘ └────────────────────┘ └────────────────────┘
//!            │    one thread each, collected under a deadline    │
//!            └─────────────────────┬─────────────────────────────┘
//!                                  ▼
//!                ┌───────────────────────────────────┐
//!                │  Min-max normalize (normalize.rs) │
//!                └───────────────────────────────────┘
//!                                  ▼
//!                ┌───────────────────────────────────┐
//!                │  Weighted / RRF fusion (hybrid)   │
//!                └───────────────────────────────────┘
//!                                  ▼
//!                ┌───────────────────────────────────┐
//!                │  Amount-aware boost (boost.rs)    │
//!                └───────────────────────────────────┘
//!                                  ▼
//!                ┌───────────────────────────────────┐
//!                │  Dedup, rank, explain (assemble)  │
//!                └───────────────────────────────────┘
//!                                  ▼
//!                           SearchResponse
//! ```

pub mod analyzer;
pub mod assemble;
pub mod bm25;
pub mod boost;
pub mod cache;
pub mod dense;
pub mod embeddings;
pub mod engine;
pub mod hybrid;
pub mod normalize;
pub mod retriever;
pub mod tfidf;

// Re-export main types
pub use analyzer::Analyzer;
pub use assemble::{Explanation, FinalResult, RetrieverContribution, assemble};
pub use bm25::{Bm25Index, Bm25Retriever, Posting};
pub use boost::{
    AmountBooster, AmountDetector, AmountIntent, AppliedBoost, BoostKind, BoostedResult,
    parse_amount,
};
pub use cache::{CacheStats, QueryCache};
pub use dense::{DenseIndex, DenseRetriever};
pub use embeddings::{Embedder, HashEmbedder, build_embedder};
pub use engine::{SearchEngine, SearchEngineBuilder, SearchRequest, SearchResponse};
pub use hybrid::{Contribution, FusedResult, FusionStrategy, RetrieverRanking, fuse};
pub use normalize::{NormalizedResult, normalize};
pub use retriever::{
    BM25, CancelToken, DENSE, IndexState, QueryInput, RawResult, Retriever, RetrieverReport,
    RetrieverStatus, TFIDF,
};
pub use tfidf::{TfidfIndex, TfidfRetriever};
