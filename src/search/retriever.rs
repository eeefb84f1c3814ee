//! Retriever interface
//!
//! Every retrieval strategy implements [`Retriever`]. The engine only sees
//! `Arc<dyn Retriever>` and never the concrete index types.

use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicBool};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::{NormError, Result};
use crate::search::analyzer::Analyzer;

/// Name of the BM25 retriever
pub const BM25: &str = "bm25";
/// Name of the TF-IDF cosine retriever
pub const TFIDF: &str = "tfidf";
/// Name of the dense embedding retriever
pub const DENSE: &str = "dense";

/// A candidate as scored by one retriever, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    pub entry_id: String,
    pub raw_score: f64,
    pub retriever: String,
}

/// Cooperative cancellation for one query.
///
/// Raised explicitly by the engine when it stops waiting, or implicitly
/// once the optional deadline passes. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same flag, cancelled at `deadline` at the latest.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            flag: Arc::clone(&self.flag),
            deadline: Some(self.deadline.map_or(deadline, |current| current.min(deadline))),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, atomic::Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(atomic::Ordering::Acquire)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// `Err(Timeout)` for `retriever` once cancelled.
    pub fn check(&self, retriever: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(NormError::Timeout {
                retriever: retriever.to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// A query prepared once and shared by every retriever.
#[derive(Debug, Clone)]
pub struct QueryInput {
    /// Original query text
    pub text: String,
    /// Analyzed terms in order of appearance
    pub tokens: Vec<String>,
    /// Long-running retrievers poll this and give up with `Timeout`
    pub cancel: CancelToken,
}

impl QueryInput {
    pub fn new(text: impl Into<String>, analyzer: &Analyzer) -> Self {
        let text = text.into();
        let tokens = analyzer.tokenize(&text);
        Self {
            text,
            tokens,
            cancel: CancelToken::new(),
        }
    }

    /// A copy bound to a different cancellation token.
    #[must_use]
    pub fn with_cancel(&self, cancel: CancelToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    /// Distinct terms, first occurrence order.
    pub fn unique_terms(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.tokens
            .iter()
            .map(String::as_str)
            .filter(|term| seen.insert(*term))
            .collect()
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// One retrieval strategy over a read-only index.
pub trait Retriever: Send + Sync {
    /// Stable name used for weights, provenance and logging.
    fn name(&self) -> &str;

    /// Return at most `k` candidates in descending score order.
    ///
    /// An empty vector means "found nothing". An error means the retriever
    /// cannot serve this query and is treated as unavailable. Implementations
    /// that do real work should poll `query.cancel` and return early.
    fn retrieve(&self, query: &QueryInput, k: usize) -> Result<Vec<RawResult>>;
}

/// Outcome of one retriever for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RetrieverStatus {
    Completed { returned: usize, elapsed_ms: u64 },
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverReport {
    pub name: String,
    pub status: RetrieverStatus,
}

impl RetrieverReport {
    pub fn completed(name: impl Into<String>, returned: usize, elapsed_ms: u64) -> Self {
        Self {
            name: name.into(),
            status: RetrieverStatus::Completed {
                returned,
                elapsed_ms,
            },
        }
    }

    pub fn unavailable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: RetrieverStatus::Unavailable {
                reason: reason.into(),
            },
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, RetrieverStatus::Completed { .. })
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.status {
            RetrieverStatus::Unavailable { reason } => Some(reason),
            RetrieverStatus::Completed { .. } => None,
        }
    }
}

/// Index handed to a retriever at construction.
#[derive(Debug)]
pub enum IndexState<T> {
    Loaded(Arc<T>),
    Missing { reason: String },
}

impl<T> IndexState<T> {
    pub fn missing(reason: impl Into<String>) -> Self {
        Self::Missing {
            reason: reason.into(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    /// Borrow the index or report the retriever as unavailable.
    pub fn require(&self, retriever: &str) -> Result<&T> {
        match self {
            Self::Loaded(index) => Ok(index.as_ref()),
            Self::Missing { reason } => Err(NormError::unavailable(retriever, reason.clone())),
        }
    }
}

/// Sort `(row, score)` pairs by score descending, ties by row ascending, and keep `k`.
///
/// Rows are index insertion positions, which makes tie order deterministic.
pub fn top_k_rows(mut scored: Vec<(usize, f64)>, k: usize) -> Vec<(usize, f64)> {
    scored.sort_by(|a, b| match b.1.total_cmp(&a.1) {
        Ordering::Equal => a.0.cmp(&b.0),
        other => other,
    });
    scored.truncate(k);
    scored
}

/// Map ranked rows to raw results.
pub fn rows_to_results(
    rows: Vec<(usize, f64)>,
    entry_ids: &[String],
    retriever: &str,
) -> Vec<RawResult> {
    rows.into_iter()
        .filter_map(|(row, score)| {
            entry_ids.get(row).map(|id| RawResult {
                entry_id: id.clone(),
                raw_score: score,
                retriever: retriever.to_string(),
            })
        })
        .collect()
}
