//! TF-IDF cosine retrieval
//!
//! Documents are stored as sparse, L2-normalized TF-IDF vectors. A query is
//! projected into the same vocabulary with the same weighting, and rows are
//! ranked by cosine similarity (a dot product, since both sides are unit
//! length). Query terms outside the vocabulary are ignored.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::corpus::InMemoryCorpus;
use crate::error::{NormError, Result};
use crate::search::analyzer::Analyzer;
use crate::search::retriever::{
    CancelToken, IndexState, QueryInput, RawResult, Retriever, TFIDF, rows_to_results, top_k_rows,
};

/// Rows scored between cancellation checks
const CANCEL_STRIDE: usize = 256;

/// Vocabulary, idf table and per-row sparse vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfIndex {
    entry_ids: Vec<String>,
    vocabulary: HashMap<String, u32>,
    idf: Vec<f64>,
    /// Sorted `(term, weight)` pairs, unit length
    rows: Vec<Vec<(u32, f64)>>,
    sublinear_tf: bool,
}

impl TfidfIndex {
    /// Fit on analyzed documents with `(1 + ln tf)` weighting and smoothed idf.
    pub fn fit<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        Self::fit_with(documents, true)
    }

    pub fn fit_with<I>(documents: I, sublinear_tf: bool) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut entry_ids = Vec::new();
        let mut vocabulary: HashMap<String, u32> = HashMap::new();
        let mut doc_freq: Vec<u32> = Vec::new();
        let mut counts: Vec<HashMap<u32, u32>> = Vec::new();

        for (entry_id, tokens) in documents {
            let mut tf: HashMap<u32, u32> = HashMap::new();
            for token in tokens {
                let next = vocabulary.len() as u32;
                let term = *vocabulary.entry(token).or_insert(next);
                if term as usize == doc_freq.len() {
                    doc_freq.push(0);
                }
                *tf.entry(term).or_insert(0) += 1;
            }
            for term in tf.keys() {
                doc_freq[*term as usize] += 1;
            }
            entry_ids.push(entry_id);
            counts.push(tf);
        }

        let n = entry_ids.len() as f64;
        let idf: Vec<f64> = doc_freq
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + f64::from(df))).ln() + 1.0)
            .collect();

        let rows = counts
            .into_iter()
            .map(|tf| {
                let mut row: Vec<(u32, f64)> = tf
                    .into_iter()
                    .map(|(term, count)| {
                        (term, term_weight(count, sublinear_tf) * idf[term as usize])
                    })
                    .collect();
                row.sort_by_key(|(term, _)| *term);
                normalize_sparse(&mut row);
                row
            })
            .collect();

        Self {
            entry_ids,
            vocabulary,
            idf,
            rows,
            sublinear_tf,
        }
    }

    pub fn from_corpus(corpus: &InMemoryCorpus, analyzer: &Analyzer) -> Self {
        Self::fit(
            corpus
                .iter()
                .map(|entry| (entry.id.clone(), analyzer.tokenize(&entry.indexable_text()))),
        )
    }

    /// Reject indices whose tables do not line up.
    pub fn validate(&self) -> Result<()> {
        if self.entry_ids.len() != self.rows.len() {
            return Err(NormError::IndexMismatch(format!(
                "tfidf: {} entry ids but {} rows",
                self.entry_ids.len(),
                self.rows.len()
            )));
        }
        if self.vocabulary.len() != self.idf.len() {
            return Err(NormError::IndexMismatch(format!(
                "tfidf: vocabulary has {} terms but idf table has {}",
                self.vocabulary.len(),
                self.idf.len()
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entry_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_ids.is_empty()
    }

    pub fn entry_ids(&self) -> &[String] {
        &self.entry_ids
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Project query tokens into the index space; `None` when no token is known.
    pub fn project(&self, tokens: &[String]) -> Option<Vec<(u32, f64)>> {
        let mut tf: HashMap<u32, u32> = HashMap::new();
        for token in tokens {
            if let Some(&term) = self.vocabulary.get(token) {
                *tf.entry(term).or_insert(0) += 1;
            }
        }
        if tf.is_empty() {
            return None;
        }

        let mut vector: Vec<(u32, f64)> = tf
            .into_iter()
            .map(|(term, count)| {
                (
                    term,
                    term_weight(count, self.sublinear_tf) * self.idf[term as usize],
                )
            })
            .collect();
        vector.sort_by_key(|(term, _)| *term);
        normalize_sparse(&mut vector);
        Some(vector)
    }

    /// Cosine similarity of every row against a projected query; zero rows omitted.
    pub fn score(&self, query: &[(u32, f64)]) -> Vec<(usize, f64)> {
        self.score_until(query, &CancelToken::new()).unwrap_or_default()
    }

    /// [`score`](Self::score), abandoned with `None` once `cancel` is raised.
    pub fn score_until(
        &self,
        query: &[(u32, f64)],
        cancel: &CancelToken,
    ) -> Option<Vec<(usize, f64)>> {
        let mut scored = Vec::new();
        for (row, vector) in self.rows.iter().enumerate() {
            if row % CANCEL_STRIDE == 0 && cancel.is_cancelled() {
                return None;
            }
            let similarity = sparse_dot(query, vector);
            if similarity > 0.0 {
                scored.push((row, similarity));
            }
        }
        Some(scored)
    }
}

fn term_weight(count: u32, sublinear: bool) -> f64 {
    if sublinear {
        1.0 + f64::from(count).ln()
    } else {
        f64::from(count)
    }
}

fn normalize_sparse(vector: &mut [(u32, f64)]) {
    let norm = vector.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for (_, weight) in vector.iter_mut() {
            *weight /= norm;
        }
    }
}

/// Dot product of two term-sorted sparse vectors.
fn sparse_dot(a: &[(u32, f64)], b: &[(u32, f64)]) -> f64 {
    let (mut i, mut j) = (0, 0);
    let mut sum = 0.0;
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum
}

/// TF-IDF cosine retriever over a shared index.
#[derive(Debug)]
pub struct TfidfRetriever {
    index: IndexState<TfidfIndex>,
}

impl TfidfRetriever {
    /// Serve `index`, or report unavailable when its tables do not line up.
    pub fn new(index: Arc<TfidfIndex>) -> Self {
        let index = match index.validate() {
            Ok(()) => IndexState::Loaded(index),
            Err(err) => {
                warn!(retriever = TFIDF, error = %err, "tfidf index unusable");
                IndexState::missing(err.to_string())
            }
        };
        Self { index }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            index: IndexState::missing(reason),
        }
    }
}

impl Retriever for TfidfRetriever {
    fn name(&self) -> &str {
        TFIDF
    }

    fn retrieve(&self, query: &QueryInput, k: usize) -> Result<Vec<RawResult>> {
        let index = self.index.require(TFIDF)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let Some(projected) = index.project(&query.tokens) else {
            return Ok(Vec::new());
        };

        let scored = index
            .score_until(&projected, &query.cancel)
            .ok_or_else(|| NormError::Timeout {
                retriever: TFIDF.to_string(),
            })?;
        let ranked = top_k_rows(scored, k);
        Ok(rows_to_results(ranked, index.entry_ids(), TFIDF))
    }
}
