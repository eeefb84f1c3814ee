//! Corpus entries and lookup
//!
//! Entries are produced by the ingestion pipeline and never mutated here.
//! The booster reads recognized entities through [`CorpusLookup`].

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{NormError, Result};

/// Entities and descriptive fields attached to an entry by ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(default)]
    pub section_title: String,
    #[serde(default)]
    pub source: String,
    /// Monetary amounts as written in the text (e.g. "320.00")
    #[serde(default, deserialize_with = "deserialize_amounts")]
    pub amounts: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub numerals: Vec<String>,
    /// Anything else ingestion recorded
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One retrievable unit of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: EntryMetadata,
}

impl CorpusEntry {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: EntryMetadata::default(),
        }
    }

    #[must_use]
    pub fn with_section(mut self, title: impl Into<String>) -> Self {
        self.metadata.section_title = title.into();
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = source.into();
        self
    }

    #[must_use]
    pub fn with_amount(mut self, amount: impl Into<String>) -> Self {
        self.metadata.amounts.push(amount.into());
        self
    }

    /// Text used for indexing: section title followed by the body.
    pub fn indexable_text(&self) -> String {
        if self.metadata.section_title.is_empty() {
            self.text.clone()
        } else {
            format!("{}\n{}", self.metadata.section_title, self.text)
        }
    }
}

/// Read-only access to corpus entries by id.
pub trait CorpusLookup: Send + Sync {
    fn get(&self, entry_id: &str) -> Option<&CorpusEntry>;

    /// Insertion position, used as the deterministic tie-break.
    fn position(&self, entry_id: &str) -> Option<usize>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Corpus held in memory in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryCorpus {
    entries: Vec<CorpusEntry>,
    by_id: HashMap<String, usize>,
}

impl InMemoryCorpus {
    /// Build from entries; ids must be unique.
    pub fn new(entries: Vec<CorpusEntry>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            if by_id.insert(entry.id.clone(), position).is_some() {
                return Err(NormError::Config(format!(
                    "duplicate corpus entry id: {}",
                    entry.id
                )));
            }
        }
        Ok(Self { entries, by_id })
    }

    /// Parse a JSON array of entries.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let entries: Vec<CorpusEntry> = serde_json::from_str(raw)?;
        Self::new(entries)
    }

    /// Load a JSON array of entries from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let corpus = Self::from_json_str(&raw)?;
        tracing::debug!(path = %path.display(), entries = corpus.len(), "corpus loaded");
        Ok(corpus)
    }

    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &CorpusEntry> {
        self.entries.iter()
    }
}

impl CorpusLookup for InMemoryCorpus {
    fn get(&self, entry_id: &str) -> Option<&CorpusEntry> {
        self.by_id.get(entry_id).map(|&idx| &self.entries[idx])
    }

    fn position(&self, entry_id: &str) -> Option<usize> {
        self.by_id.get(entry_id).copied()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn deserialize_amounts<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAmount {
        Text(String),
        Number(f64),
    }

    let raw = Vec::<RawAmount>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|amount| match amount {
            RawAmount::Text(text) => text,
            RawAmount::Number(value) => format!("{value:.2}"),
        })
        .collect())
}
