//! normativa config - Print the effective configuration

use clap::Args;

use crate::cli::OutputFormat;
use crate::cli::commands::CommandContext;
use crate::cli::output;
use crate::config::Config;
use crate::error::{NormError, Result};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Print a single section (engine, bm25, dense, fusion, boost, cache)
    pub section: Option<String>,
}

pub fn run(ctx: &CommandContext, args: &ConfigArgs) -> Result<()> {
    let value = section_value(&ctx.config, args.section.as_deref())?;

    match ctx.format {
        OutputFormat::Json | OutputFormat::Jsonl => {
            output::emit_json(&output::robot_ok(value))
        }
        OutputFormat::Tsv => {
            let rows = flatten("", &value);
            output::emit_tsv(&["key", "value"], &rows, |(key, value)| {
                vec![key.clone(), value.clone()]
            });
            Ok(())
        }
        OutputFormat::Human | OutputFormat::Plain => {
            let rendered = toml::to_string_pretty(&value)
                .map_err(|err| NormError::Serialization(format!("render config: {err}")))?;
            println!("{rendered}");
            Ok(())
        }
    }
}

fn section_value(config: &Config, section: Option<&str>) -> Result<serde_json::Value> {
    let value = serde_json::to_value(config)?;
    let Some(name) = section else {
        return Ok(value);
    };
    value
        .get(name)
        .cloned()
        .ok_or_else(|| NormError::Config(format!("unknown config section: {name}")))
}

/// `dotted.key` / rendered value pairs, in key order.
fn flatten(prefix: &str, value: &serde_json::Value) -> Vec<(String, String)> {
    match value {
        serde_json::Value::Object(map) => map
            .iter()
            .flat_map(|(key, child)| {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, child)
            })
            .collect(),
        serde_json::Value::String(text) => vec![(prefix.to_string(), text.clone())],
        other => vec![(prefix.to_string(), other.to_string())],
    }
}
