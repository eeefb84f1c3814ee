//! Text analysis shared by queries and fixture indices
//!
//! Uses Tantivy's tokenizer pipeline: split on non-alphanumerics, drop
//! oversized tokens, lowercase, fold accents to ASCII, remove Spanish stop
//! words. Queries and indices must go through the same analyzer or their
//! vocabularies will not line up.

use tantivy::tokenizer::{
    AsciiFoldingFilter, LowerCaser, RemoveLongFilter, SimpleTokenizer, StopWordFilter,
    TextAnalyzer, TokenStream,
};

/// Tokens longer than this (in bytes) are dropped
const MAX_TOKEN_LEN: usize = 40;

/// Accent-folded Spanish function words.
const SPANISH_STOP_WORDS: &[&str] = &[
    "a", "al", "ante", "con", "como", "cual", "de", "del", "desde", "e", "el", "ella", "en",
    "entre", "es", "esta", "este", "esto", "ha", "han", "hasta", "la", "las", "le", "les", "lo",
    "los", "mas", "mediante", "ni", "o", "para", "pero", "por", "que", "se", "segun", "ser",
    "si", "sin", "sobre", "su", "sus", "tal", "u", "un", "una", "uno", "y", "ya",
];

/// Text analyzer producing folded, lowercase index terms.
#[derive(Clone)]
pub struct Analyzer {
    inner: TextAnalyzer,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::spanish()
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer").finish_non_exhaustive()
    }
}

impl Analyzer {
    /// Analyzer for Spanish regulatory text.
    pub fn spanish() -> Self {
        let stop_words = SPANISH_STOP_WORDS.iter().map(|word| (*word).to_string());
        let inner = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
            .filter(LowerCaser)
            .filter(AsciiFoldingFilter)
            .filter(StopWordFilter::remove(stop_words))
            .build();
        Self { inner }
    }

    /// Analyzer without stop-word removal.
    pub fn keep_all() -> Self {
        let inner = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
            .filter(LowerCaser)
            .filter(AsciiFoldingFilter)
            .build();
        Self { inner }
    }

    /// Tokenize text into analyzed terms, in order of appearance.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        // token_stream needs &mut; the analyzer is cheap to clone
        let mut analyzer = self.inner.clone();
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        while stream.advance() {
            tokens.push(stream.token().text.clone());
        }
        tokens
    }

    /// Fold a single word the way tokens are folded (first token only).
    pub fn fold_word(word: &str) -> Option<String> {
        let mut analyzer = Self::keep_all().inner;
        let mut stream = analyzer.token_stream(word);
        if stream.advance() {
            Some(stream.token().text.clone())
        } else {
            None
        }
    }
}
