//! Dense embedding retrieval
//!
//! A precomputed matrix of entry embeddings scored against the query
//! embedding by cosine similarity. The index records the model that
//! produced it; a retriever paired with a different model (or dimension)
//! refuses to serve rather than return meaningless scores.

use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::corpus::InMemoryCorpus;
use crate::error::{NormError, Result};
use crate::search::embeddings::{Embedder, dot_product, l2_norm, l2_normalize};
use crate::search::retriever::{
    CancelToken, DENSE, IndexState, QueryInput, RawResult, Retriever, rows_to_results, top_k_rows,
};

/// Rows below this count are scored on the calling thread
const PARALLEL_THRESHOLD: usize = 1_024;
/// Rows scored between cancellation checks
const CANCEL_STRIDE: usize = 4 * PARALLEL_THRESHOLD;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseIndex {
    entry_ids: Vec<String>,
    rows: Vec<Vec<f32>>,
    dims: usize,
    model_id: String,
    /// Rows are unit length, so cosine is a dot product
    normalized: bool,
}

impl DenseIndex {
    /// Wrap precomputed embeddings; every row must have `dims` components.
    pub fn from_rows(
        entry_ids: Vec<String>,
        mut rows: Vec<Vec<f32>>,
        dims: usize,
        model_id: impl Into<String>,
        normalize: bool,
    ) -> Result<Self> {
        if entry_ids.len() != rows.len() {
            return Err(NormError::IndexMismatch(format!(
                "dense: {} entry ids but {} rows",
                entry_ids.len(),
                rows.len()
            )));
        }
        if let Some((row, bad)) = rows.iter().enumerate().find(|(_, row)| row.len() != dims) {
            return Err(NormError::IndexMismatch(format!(
                "dense: row {row} has {} components, expected {dims}",
                bad.len()
            )));
        }
        if normalize {
            for row in &mut rows {
                l2_normalize(row);
            }
        }
        Ok(Self {
            entry_ids,
            rows,
            dims,
            model_id: model_id.into(),
            normalized: normalize,
        })
    }

    /// Embed every corpus entry.
    pub fn build(corpus: &InMemoryCorpus, embedder: &dyn Embedder) -> Result<Self> {
        let entry_ids = corpus.iter().map(|entry| entry.id.clone()).collect();
        let rows = corpus
            .entries()
            .par_iter()
            .map(|entry| embedder.embed(&entry.indexable_text()))
            .collect();
        Self::from_rows(entry_ids, rows, embedder.dims(), embedder.model_id(), true)
    }

    pub fn len(&self) -> usize {
        self.entry_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_ids.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn entry_ids(&self) -> &[String] {
        &self.entry_ids
    }

    /// Cosine similarity of every row against `query`, in row order.
    pub fn similarities(&self, query: &[f32]) -> Vec<f32> {
        self.similarities_until(query, &CancelToken::new())
            .unwrap_or_default()
    }

    /// [`similarities`](Self::similarities), abandoned with `None` once `cancel` is raised.
    pub fn similarities_until(&self, query: &[f32], cancel: &CancelToken) -> Option<Vec<f32>> {
        let query_norm = l2_norm(query);
        let score = |row: &Vec<f32>| {
            let dot = dot_product(query, row);
            let denom = if self.normalized {
                query_norm
            } else {
                query_norm * l2_norm(row)
            };
            if denom > 0.0 { dot / denom } else { 0.0 }
        };

        let mut similarities = Vec::with_capacity(self.rows.len());
        for chunk in self.rows.chunks(CANCEL_STRIDE) {
            if cancel.is_cancelled() {
                return None;
            }
            if chunk.len() >= PARALLEL_THRESHOLD {
                similarities.par_extend(chunk.par_iter().map(&score));
            } else {
                similarities.extend(chunk.iter().map(&score));
            }
        }
        Some(similarities)
    }
}

/// Why an index cannot be served by an embedder, if it cannot.
fn incompatibility(index: &DenseIndex, embedder: &dyn Embedder) -> Option<String> {
    let model_id = embedder.model_id();
    if index.model_id != model_id {
        return Some(format!(
            "index built with model '{}' but query embedder is '{model_id}'",
            index.model_id
        ));
    }
    if index.dims != embedder.dims() {
        return Some(format!(
            "index has {} dimensions but query embedder produces {}",
            index.dims,
            embedder.dims()
        ));
    }
    None
}

pub struct DenseRetriever {
    index: IndexState<DenseIndex>,
    embedder: Arc<dyn Embedder>,
    min_similarity: f32,
}

impl fmt::Debug for DenseRetriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DenseRetriever")
            .field("index", &self.index)
            .field("model_id", &self.embedder.model_id())
            .field("min_similarity", &self.min_similarity)
            .finish()
    }
}

impl DenseRetriever {
    /// Pair an index with a query embedder; a mismatch leaves the retriever unavailable.
    pub fn new(index: Arc<DenseIndex>, embedder: Arc<dyn Embedder>, min_similarity: f32) -> Self {
        let index = match incompatibility(&index, embedder.as_ref()) {
            Some(reason) => {
                warn!(retriever = DENSE, %reason, "dense index unusable");
                IndexState::missing(reason)
            }
            None => IndexState::Loaded(index),
        };
        Self {
            index,
            embedder,
            min_similarity,
        }
    }

    pub fn unavailable(
        reason: impl Into<String>,
        embedder: Arc<dyn Embedder>,
        min_similarity: f32,
    ) -> Self {
        Self {
            index: IndexState::missing(reason),
            embedder,
            min_similarity,
        }
    }

    pub fn is_available(&self) -> bool {
        self.index.is_loaded()
    }
}

impl Retriever for DenseRetriever {
    fn name(&self) -> &str {
        DENSE
    }

    fn retrieve(&self, query: &QueryInput, k: usize) -> Result<Vec<RawResult>> {
        let index = self.index.require(DENSE)?;
        if k == 0 || index.is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(&query.text);
        if l2_norm(&embedding) == 0.0 {
            return Ok(Vec::new());
        }

        let scored: Vec<(usize, f64)> = index
            .similarities_until(&embedding, &query.cancel)
            .ok_or_else(|| NormError::Timeout {
                retriever: DENSE.to_string(),
            })?
            .into_iter()
            .enumerate()
            .filter(|&(_, similarity)| similarity.is_finite() && similarity > self.min_similarity)
            .map(|(row, similarity)| (row, f64::from(similarity)))
            .collect();

        Ok(rows_to_results(top_k_rows(scored, k), index.entry_ids(), DENSE))
    }
}
