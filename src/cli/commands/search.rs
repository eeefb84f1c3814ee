//! normativa search - Hybrid search over a corpus file
//!
//! Builds BM25, TF-IDF and dense indices from the corpus, then runs the
//! fused, amount-aware pipeline once.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use colored::Colorize;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::cli::commands::CommandContext;
use crate::cli::output::{self, HumanLayout};
use crate::config::{Config, FusionKind, parse_fusion_kind, parse_weights};
use crate::corpus::{CorpusLookup, InMemoryCorpus};
use crate::error::Result;
use crate::search::{
    FinalResult, FusionStrategy, RetrieverContribution, RetrieverStatus, SearchEngine,
    SearchRequest, SearchResponse,
};

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search query
    pub query: String,

    /// Corpus file (JSON array of entries)
    #[arg(long)]
    pub corpus: PathBuf,

    /// Number of results (default: engine.default_k)
    #[arg(short, long)]
    pub k: Option<usize>,

    /// Fusion strategy: weighted or rrf
    #[arg(long)]
    pub strategy: Option<String>,

    /// RRF damping constant
    #[arg(long)]
    pub k_rrf: Option<f64>,

    /// Retriever weight as name=value (repeatable)
    #[arg(long = "weight", value_name = "NAME=VALUE")]
    pub weights: Vec<String>,

    /// Show per-retriever contributions for each result
    #[arg(long)]
    pub explain: bool,
}

impl SearchArgs {
    /// Configured request with command-line overrides applied.
    pub fn request(&self, config: &Config) -> Result<SearchRequest> {
        let kind = match self.strategy.as_deref() {
            Some(raw) => parse_fusion_kind(raw)?,
            None => config.fusion.strategy,
        };
        let strategy = match kind {
            FusionKind::Rrf => {
                FusionStrategy::rrf(self.k_rrf.unwrap_or(config.fusion.k_rrf))
            }
            FusionKind::Weighted if self.weights.is_empty() => FusionStrategy::Weighted {
                weights: config.fusion.weights.clone(),
            },
            FusionKind::Weighted => FusionStrategy::Weighted {
                weights: parse_weights(&self.weights)?,
            },
        };
        Ok(SearchRequest::new(
            self.k.unwrap_or(config.engine.default_k),
            strategy,
        ))
    }
}

pub fn run(ctx: &CommandContext, args: &SearchArgs) -> Result<()> {
    let corpus = Arc::new(InMemoryCorpus::load(&args.corpus)?);
    let request = args.request(&ctx.config)?;
    let engine = SearchEngine::from_corpus(ctx.config.clone(), Arc::clone(&corpus))?;
    let response = engine.search(&args.query, &request)?;

    match ctx.format {
        OutputFormat::Json => output::emit_json(&output::robot_ok(SearchOutput {
            strategy: request.strategy.name(),
            k: request.k,
            response: &response,
        })),
        OutputFormat::Jsonl => output::emit_jsonl(&response.results),
        OutputFormat::Tsv => {
            output::emit_tsv(
                &["rank", "id", "score", "boost", "retrievers"],
                &response.results,
                |result| {
                    vec![
                        result.rank.to_string(),
                        result.entry_id.clone(),
                        format!("{:.6}", result.score),
                        result.boost_applied().to_string(),
                        result.contributing_retrievers().join(","),
                    ]
                },
            );
            Ok(())
        }
        OutputFormat::Plain => {
            print_plain(&response, corpus.as_ref(), args.explain);
            Ok(())
        }
        OutputFormat::Human => {
            print_human(&response, corpus.as_ref(), args.explain);
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct SearchOutput<'a> {
    strategy: &'static str,
    k: usize,
    #[serde(flatten)]
    response: &'a SearchResponse,
}

fn print_human(response: &SearchResponse, corpus: &dyn CorpusLookup, explain: bool) {
    if response.is_empty() {
        println!(
            "{} No entries found for '{}'",
            "!".yellow(),
            response.query.cyan()
        );
        print_unavailable(response, true);
        return;
    }

    println!(
        "{} results for '{}':",
        response.results.len().to_string().bold(),
        response.query.cyan()
    );
    if response.amount_intent.triggered {
        println!("{}", "  amount intent detected".dimmed());
    }
    println!();

    for result in &response.results {
        let rank = format!("{}.", result.rank);
        let title = corpus
            .get(&result.entry_id)
            .map(|entry| entry.metadata.section_title.clone())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| result.entry_id.clone());
        let boost = if result.boost_applied() {
            " [boost]".green().to_string()
        } else {
            String::new()
        };

        println!("{:4} {}{}", rank.dimmed(), title.bold(), boost);
        println!(
            "     {} (score: {:.4}, via: {})",
            result.entry_id.dimmed(),
            result.score,
            result.contributing_retrievers().join(", ")
        );
        if let Some(entry) = corpus.get(&result.entry_id) {
            let snippet = truncate_str(&entry.text, 77);
            let suffix = if entry.text.chars().count() > 77 { "..." } else { "" };
            println!("     {}{}", snippet.dimmed(), suffix);
        }
        if explain {
            for line in explain_lines(result) {
                println!("       {}", line.dimmed());
            }
        }
        println!();
    }

    print_unavailable(response, true);
}

fn print_plain(response: &SearchResponse, corpus: &dyn CorpusLookup, explain: bool) {
    let mut layout = HumanLayout::plain();
    layout.title(&format!("{} results for '{}'", response.results.len(), response.query));
    for result in &response.results {
        let title = corpus
            .get(&result.entry_id)
            .map(|entry| entry.metadata.section_title.as_str())
            .unwrap_or_default();
        layout.push_line(format!(
            "{}. {} {:.4} {}",
            result.rank, result.entry_id, result.score, title
        ));
        if explain {
            for line in explain_lines(result) {
                layout.push_line(format!("   {line}"));
            }
        }
    }
    println!("{}", layout.build());
    print_unavailable(response, false);
}

fn explain_lines(result: &FinalResult) -> Vec<String> {
    let mut lines: Vec<String> = result
        .explanation
        .retrievers
        .iter()
        .map(|(name, contribution)| match contribution {
            RetrieverContribution::Scored {
                norm_score,
                raw_score,
                rank,
                share,
            } => format!(
                "{name}: rank {rank}, raw {raw_score:.4}, norm {norm_score:.3}, share {:.0}%",
                share * 100.0
            ),
            RetrieverContribution::Absent => format!("{name}: absent"),
            RetrieverContribution::Unavailable { reason } => {
                format!("{name}: unavailable ({reason})")
            }
        })
        .collect();
    if let Some(boost) = &result.explanation.boost {
        lines.push(format!("boost: {:?} +{:.4}", boost.kind, boost.bonus));
    }
    lines
}

fn print_unavailable(response: &SearchResponse, styled: bool) {
    for report in response.unavailable() {
        if let RetrieverStatus::Unavailable { reason } = &report.status {
            if styled {
                eprintln!(
                    "{} {} unavailable: {}",
                    "!".yellow(),
                    report.name.bold(),
                    reason
                );
            } else {
                eprintln!("! {} unavailable: {reason}", report.name);
            }
        }
    }
}

/// Truncate a string to a maximum number of characters (not bytes), safe for UTF-8
fn truncate_str(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
