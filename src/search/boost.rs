//! Amount-aware re-ranking
//!
//! Queries about money ("monto máximo de viáticos", "S/ 320.00") should
//! surface passages that actually state an amount. When the query carries
//! monetary intent, entries with a recognized amount receive an additive
//! bonus proportional to the best fused score in the batch:
//!
//! ```text
//! M      = max fused score before boosting
//! bonus  = min(fraction, max_bonus_fraction) · M
//! fraction = exact_match_bonus   if an entry amount equals a query amount
//!          = amount_bonus        otherwise
//! ```
//!
//! Non-triggering queries pass through untouched.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::BoostConfig;
use crate::corpus::{CorpusEntry, CorpusLookup};
use crate::search::analyzer::Analyzer;
use crate::search::hybrid::FusedResult;
use crate::search::retriever::QueryInput;

/// Currency marker followed by a number: `S/ 320.00`, `S/.1,500`, `US$ 40`, `PEN 75`.
/// The marker must not be glued to a preceding letter or digit (`informes/2023`).
static MONEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^\p{L}\p{N}])(?:s/\.?|us\$|\$|usd\b|pen\b)\s*(\d[\d.,]*\d|\d)")
        .expect("money regex compiles")
});

/// Bare amount with two decimals: `320.00`, `1500.00`, `1,500.00`, `2.400,50`
static DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,3}(?:[.,]\d{3})+[.,]\d{2}|\d+[.,]\d{2})\b")
        .expect("decimal regex compiles")
});

/// Any number, with optional grouping or decimal separators
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d.,]*\d|\d").expect("number regex compiles"));

/// Parse a written amount into cents.
///
/// A final separator followed by exactly three digits is a thousands
/// separator when every separator in the number is the same character
/// (`1,500` and `1.500.000`). One or two trailing digits are decimals
/// (`320.00`, `1,500.5`, `2.400,50`). Anything else is rejected.
pub fn parse_amount(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if !raw.starts_with(|c: char| c.is_ascii_digit())
        || !raw.ends_with(|c: char| c.is_ascii_digit())
        || !raw.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',')
    {
        return None;
    }

    let separators: Vec<(usize, char)> = raw
        .char_indices()
        .filter(|(_, c)| !c.is_ascii_digit())
        .collect();
    let Some(&(last_idx, last_sep)) = separators.last() else {
        return raw.parse::<i64>().ok()?.checked_mul(100);
    };

    let tail = &raw[last_idx + 1..];
    let uniform = separators.iter().all(|(_, c)| *c == last_sep);

    if tail.len() == 3 && uniform {
        return digits_only(raw).parse::<i64>().ok()?.checked_mul(100);
    }
    if tail.len() > 2 {
        return None;
    }

    let units = digits_only(&raw[..last_idx]).parse::<i64>().ok()?;
    let fraction = tail.parse::<i64>().ok()?;
    let cents = if tail.len() == 1 { fraction * 10 } else { fraction };
    units.checked_mul(100)?.checked_add(cents)
}

fn digits_only(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Render cents as `1500.00`.
pub fn format_cents(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, (cents % 100).abs())
}

/// Amounts written in running text next to a currency marker or with two decimals.
pub fn scan_amounts(text: &str) -> Vec<i64> {
    let mut seen = HashSet::new();
    MONEY_RE
        .captures_iter(text)
        .chain(DECIMAL_RE.captures_iter(text))
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| parse_amount(m.as_str()))
        .filter(|cents| seen.insert(*cents))
        .collect()
}

/// Monetary intent detected in a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountIntent {
    pub triggered: bool,
    pub keywords: Vec<String>,
    pub symbols: Vec<String>,
    pub numeric_pattern: bool,
    /// Amounts named in the query, in cents
    pub amounts: Vec<i64>,
}

/// Decides whether a query is about money.
#[derive(Debug, Clone)]
pub struct AmountDetector {
    keywords: HashSet<String>,
    /// Alphanumeric symbols (`pen`, `usd`) compared against query tokens
    symbol_words: Vec<String>,
    /// Punctuated symbols (`s/`, `$`) searched in the lowercased text
    symbol_marks: Vec<String>,
}

impl AmountDetector {
    pub fn new(config: &BoostConfig) -> Self {
        let keywords = config
            .keywords
            .iter()
            .filter_map(|word| Analyzer::fold_word(word))
            .collect();

        let (symbol_words, symbol_marks): (Vec<String>, Vec<String>) = config
            .currency_symbols
            .iter()
            .map(|symbol| symbol.trim().to_lowercase())
            .filter(|symbol| !symbol.is_empty())
            .partition(|symbol| symbol.chars().all(char::is_alphanumeric));

        Self {
            keywords,
            symbol_words,
            symbol_marks,
        }
    }

    pub fn detect(&self, query: &QueryInput) -> AmountIntent {
        let mut keywords: Vec<String> = Vec::new();
        for token in &query.tokens {
            if self.keywords.contains(token) && !keywords.contains(token) {
                keywords.push(token.clone());
            }
        }

        let lowered = query.text.to_lowercase();
        let mut symbols: Vec<String> = self
            .symbol_words
            .iter()
            .filter(|symbol| query.tokens.iter().any(|token| token == *symbol))
            .cloned()
            .collect();
        symbols.extend(
            self.symbol_marks
                .iter()
                .filter(|mark| contains_mark(&lowered, mark))
                .cloned(),
        );

        let numeric_pattern = MONEY_RE.is_match(&query.text) || DECIMAL_RE.is_match(&query.text);
        let triggered = !keywords.is_empty() || !symbols.is_empty() || numeric_pattern;

        let amounts = if triggered {
            let mut seen = HashSet::new();
            NUMBER_RE
                .find_iter(&query.text)
                .filter_map(|m| parse_amount(m.as_str()))
                .filter(|cents| seen.insert(*cents))
                .collect()
        } else {
            Vec::new()
        };

        AmountIntent {
            triggered,
            keywords,
            symbols,
            numeric_pattern,
            amounts,
        }
    }
}

/// `mark` occurs in `text` not glued to a preceding letter or digit.
fn contains_mark(text: &str, mark: &str) -> bool {
    text.match_indices(mark).any(|(idx, _)| {
        text[..idx]
            .chars()
            .next_back()
            .is_none_or(|prev| !prev.is_alphanumeric())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostKind {
    /// Entry states some amount
    Amount,
    /// Entry states an amount the query names
    ExactMatch,
}

/// Bonus added to one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedBoost {
    pub kind: BoostKind,
    /// Fraction of the batch maximum, after capping
    pub fraction: f64,
    pub bonus: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_amount: Option<String>,
}

/// A fused result after the booster ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedResult {
    pub fused: FusedResult,
    /// Fused score plus any bonus
    pub score: f64,
    pub boost: Option<AppliedBoost>,
}

impl BoostedResult {
    /// Pass a fused result through with no bonus.
    pub fn unboosted(fused: FusedResult) -> Self {
        Self {
            score: fused.fused_score,
            fused,
            boost: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AmountBooster {
    config: BoostConfig,
    detector: AmountDetector,
}

impl AmountBooster {
    pub fn new(config: BoostConfig) -> Self {
        let detector = AmountDetector::new(&config);
        Self { config, detector }
    }

    pub fn detect(&self, query: &QueryInput) -> AmountIntent {
        if !self.config.enabled {
            return AmountIntent::default();
        }
        self.detector.detect(query)
    }

    /// Amounts an entry states, in cents.
    pub fn entry_amounts(&self, entry: &CorpusEntry) -> Vec<i64> {
        let from_metadata: Vec<i64> = entry
            .metadata
            .amounts
            .iter()
            .filter_map(|raw| {
                NUMBER_RE
                    .find(raw)
                    .and_then(|m| parse_amount(m.as_str()))
            })
            .collect();

        if from_metadata.is_empty() && self.config.scan_text_fallback {
            scan_amounts(&entry.text)
        } else {
            from_metadata
        }
    }

    /// Re-score a fused batch. Identity unless the intent triggered.
    pub fn apply(
        &self,
        intent: &AmountIntent,
        fused: Vec<FusedResult>,
        corpus: &dyn CorpusLookup,
    ) -> Vec<BoostedResult> {
        if !self.config.enabled || !intent.triggered {
            return fused.into_iter().map(BoostedResult::unboosted).collect();
        }

        let max_score = fused
            .iter()
            .map(|result| result.fused_score)
            .filter(|score| score.is_finite())
            .fold(f64::NEG_INFINITY, f64::max);
        if max_score <= 0.0 {
            return fused.into_iter().map(BoostedResult::unboosted).collect();
        }

        let cap = self.config.max_bonus_fraction;
        let query_amounts: HashSet<i64> = intent.amounts.iter().copied().collect();

        fused
            .into_iter()
            .map(|result| {
                let Some(entry) = corpus.get(&result.entry_id) else {
                    debug!(entry_id = %result.entry_id, "fused entry missing from corpus");
                    return BoostedResult::unboosted(result);
                };
                let amounts = self.entry_amounts(entry);
                if amounts.is_empty() {
                    return BoostedResult::unboosted(result);
                }

                let matched = amounts.iter().find(|cents| query_amounts.contains(cents));
                let (kind, fraction) = match matched {
                    Some(_) => (BoostKind::ExactMatch, self.config.exact_match_bonus),
                    None => (BoostKind::Amount, self.config.amount_bonus),
                };
                let fraction = fraction.min(cap);
                let bonus = fraction * max_score;

                BoostedResult {
                    score: result.fused_score + bonus,
                    fused: result,
                    boost: Some(AppliedBoost {
                        kind,
                        fraction,
                        bonus,
                        matched_amount: matched.map(|cents| format_cents(*cents)),
                    }),
                }
            })
            .collect()
    }
}
