//! BM25 lexical retrieval
//!
//! Scores documents with Okapi BM25 over a prebuilt, read-only term
//! statistics table:
//!
//! ```text
//! score(d) = Σ_t IDF(t) · f(t,d)·(k1+1) / (f(t,d) + k1·(1 − b + b·|d|/avgdl))
//! IDF(t)   = ln(1 + (N − df + 0.5) / (df + 0.5))
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Bm25Config;
use crate::corpus::InMemoryCorpus;
use crate::error::{NormError, Result};
use crate::search::analyzer::Analyzer;
use crate::search::retriever::{
    BM25, CancelToken, IndexState, QueryInput, RawResult, Retriever, rows_to_results, top_k_rows,
};

/// A single entry in a term's postings list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Row in the index's entry ordering
    pub row: u32,
    /// Occurrences of the term in that row
    pub term_frequency: u32,
}

/// Read-only BM25 term statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Index {
    entry_ids: Vec<String>,
    doc_lengths: Vec<u32>,
    postings: HashMap<String, Vec<Posting>>,
    avg_doc_length: f64,
}

impl Bm25Index {
    /// Assemble an index from externally computed statistics.
    pub fn from_parts(
        entry_ids: Vec<String>,
        doc_lengths: Vec<u32>,
        mut postings: HashMap<String, Vec<Posting>>,
    ) -> Result<Self> {
        if entry_ids.len() != doc_lengths.len() {
            return Err(NormError::IndexMismatch(format!(
                "bm25: {} entry ids but {} document lengths",
                entry_ids.len(),
                doc_lengths.len()
            )));
        }
        for (term, list) in &mut postings {
            if let Some(bad) = list.iter().find(|p| p.row as usize >= entry_ids.len()) {
                return Err(NormError::IndexMismatch(format!(
                    "bm25: posting for '{term}' points at row {} of {}",
                    bad.row,
                    entry_ids.len()
                )));
            }
            list.sort_by_key(|p| p.row);
        }

        let total: u64 = doc_lengths.iter().map(|&len| u64::from(len)).sum();
        let avg_doc_length = if doc_lengths.is_empty() {
            0.0
        } else {
            total as f64 / doc_lengths.len() as f64
        };

        Ok(Self {
            entry_ids,
            doc_lengths,
            postings,
            avg_doc_length,
        })
    }

    /// Count term frequencies over already-analyzed documents.
    pub fn from_documents<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut entry_ids = Vec::new();
        let mut doc_lengths = Vec::new();
        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();

        for (row, (entry_id, tokens)) in documents.into_iter().enumerate() {
            let mut tf_map: HashMap<&str, u32> = HashMap::new();
            for token in &tokens {
                *tf_map.entry(token.as_str()).or_insert(0) += 1;
            }
            for (term, term_frequency) in tf_map {
                postings.entry(term.to_string()).or_default().push(Posting {
                    row: row as u32,
                    term_frequency,
                });
            }
            entry_ids.push(entry_id);
            doc_lengths.push(tokens.len() as u32);
        }

        let total: u64 = doc_lengths.iter().map(|&len| u64::from(len)).sum();
        let avg_doc_length = if doc_lengths.is_empty() {
            0.0
        } else {
            total as f64 / doc_lengths.len() as f64
        };

        Self {
            entry_ids,
            doc_lengths,
            postings,
            avg_doc_length,
        }
    }

    /// Index every corpus entry with the given analyzer.
    pub fn from_corpus(corpus: &InMemoryCorpus, analyzer: &Analyzer) -> Self {
        Self::from_documents(
            corpus
                .iter()
                .map(|entry| (entry.id.clone(), analyzer.tokenize(&entry.indexable_text()))),
        )
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

    pub fn avg_doc_length(&self) -> f64 {
        self.avg_doc_length
    }

    /// Number of rows containing `term`.
    pub fn doc_frequency(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, Vec::len)
    }

    /// Inverse document frequency (always positive for known terms).
    pub fn idf(&self, term: &str) -> f64 {
        let n = self.len() as f64;
        let df = self.doc_frequency(term) as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Score every row against the distinct query terms; rows with zero score are omitted.
    pub fn score(&self, terms: &[&str], params: Bm25Config) -> Vec<(usize, f64)> {
        self.score_until(terms, params, &CancelToken::new())
            .unwrap_or_default()
    }

    /// [`score`](Self::score), abandoned with `None` once `cancel` is raised.
    pub fn score_until(
        &self,
        terms: &[&str],
        params: Bm25Config,
        cancel: &CancelToken,
    ) -> Option<Vec<(usize, f64)>> {
        if terms.is_empty() || self.is_empty() || self.avg_doc_length <= 0.0 {
            return Some(Vec::new());
        }

        let Bm25Config { k1, b } = params;
        let mut scores = vec![0.0_f64; self.len()];
        let mut touched = vec![false; self.len()];

        for term in terms {
            if cancel.is_cancelled() {
                return None;
            }
            let Some(postings) = self.postings.get(*term) else {
                continue;
            };
            let idf = self.idf(term);

            for posting in postings {
                let row = posting.row as usize;
                let tf = f64::from(posting.term_frequency);
                let dl = f64::from(self.doc_lengths[row]);
                let tf_norm = (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * dl / self.avg_doc_length));
                scores[row] += idf * tf_norm;
                touched[row] = true;
            }
        }

        Some(
            scores
                .into_iter()
                .enumerate()
                .filter(|&(row, score)| touched[row] && score > 0.0)
                .collect(),
        )
    }
}

/// BM25 retriever over a shared index.
#[derive(Debug)]
pub struct Bm25Retriever {
    index: IndexState<Bm25Index>,
    params: Bm25Config,
}

impl Bm25Retriever {
    pub fn new(index: Arc<Bm25Index>, params: Bm25Config) -> Self {
        Self {
            index: IndexState::Loaded(index),
            params,
        }
    }

    /// A retriever whose index failed to load; every query reports it unavailable.
    pub fn unavailable(reason: impl Into<String>, params: Bm25Config) -> Self {
        Self {
            index: IndexState::missing(reason),
            params,
        }
    }
}

impl Retriever for Bm25Retriever {
    fn name(&self) -> &str {
        BM25
    }

    fn retrieve(&self, query: &QueryInput, k: usize) -> Result<Vec<RawResult>> {
        let index = self.index.require(BM25)?;
        let terms = query.unique_terms();
        if terms.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let scored = index
            .score_until(&terms, self.params, &query.cancel)
            .ok_or_else(|| NormError::Timeout {
                retriever: BM25.to_string(),
            })?;
        let ranked = top_k_rows(scored, k);
        Ok(rows_to_results(ranked, index.entry_ids(), BM25))
    }
}
