use chrono::{DateTime, Utc};
use clap::ValueEnum;
use console::style;
use serde::Serialize;

use crate::error::{ErrorCode, NormError, Result};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable formatted output with colors (default)
    #[default]
    Human,
    /// Pretty-printed JSON
    Json,
    /// Newline-delimited JSON (one object per line)
    Jsonl,
    /// Plain text without colors or formatting
    Plain,
    /// Tab-separated values (for shell scripting)
    Tsv,
}

impl OutputFormat {
    #[must_use]
    pub const fn use_colors(&self) -> bool {
        matches!(self, OutputFormat::Human)
    }

    #[must_use]
    pub const fn is_machine_readable(&self) -> bool {
        matches!(
            self,
            OutputFormat::Json | OutputFormat::Jsonl | OutputFormat::Tsv
        )
    }
}

#[derive(Serialize)]
pub struct RobotResponse<T> {
    pub status: RobotStatus,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub data: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotStatus {
    Ok,
    #[serde(rename = "error")]
    StructuredError {
        code: ErrorCode,
        numeric_code: u16,
        message: String,
        suggestion: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<serde_json::Value>,
        recoverable: bool,
        category: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        help_url: Option<String>,
    },
}

pub fn robot_ok<T: Serialize>(data: T) -> RobotResponse<T> {
    RobotResponse {
        status: RobotStatus::Ok,
        timestamp: Utc::now(),
        version: crate::VERSION.to_string(),
        data,
        warnings: Vec::new(),
    }
}

/// Error envelope carrying code, suggestion and context.
pub fn robot_error_structured(err: &NormError) -> RobotResponse<serde_json::Value> {
    RobotResponse {
        status: RobotStatus::from(err),
        timestamp: Utc::now(),
        version: crate::VERSION.to_string(),
        data: serde_json::Value::Null,
        warnings: Vec::new(),
    }
}

impl From<&NormError> for RobotStatus {
    fn from(err: &NormError) -> Self {
        let structured = err.to_structured();
        RobotStatus::StructuredError {
            code: structured.code,
            numeric_code: structured.numeric_code,
            message: structured.message,
            suggestion: structured.suggestion,
            context: structured.context,
            recoverable: structured.recoverable,
            category: structured.category,
            help_url: structured.help_url,
        }
    }
}

pub fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value)
        .map_err(|err| NormError::Serialization(format!("serialize output: {err}")))?;
    println!("{payload}");
    Ok(())
}

/// One compact JSON document per line.
pub fn emit_jsonl<T: Serialize>(items: &[T]) -> Result<()> {
    for item in items {
        let line = serde_json::to_string(item)
            .map_err(|err| NormError::Serialization(format!("serialize output: {err}")))?;
        println!("{line}");
    }
    Ok(())
}

pub fn emit_tsv<T, F>(headers: &[&str], items: &[T], row_fn: F)
where
    F: Fn(&T) -> Vec<String>,
{
    println!("{}", headers.join("\t"));
    for item in items {
        let row: Vec<String> = row_fn(item)
            .into_iter()
            .map(|cell| cell.replace(['\t', '\n'], " "))
            .collect();
        println!("{}", row.join("\t"));
    }
}

pub struct HumanLayout {
    lines: Vec<String>,
    key_width: usize,
    styled: bool,
}

impl Default for HumanLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanLayout {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lines: Vec::new(),
            key_width: 18,
            styled: true,
        }
    }

    /// Layout without terminal styling, for `--plain`.
    #[must_use]
    pub const fn plain() -> Self {
        Self {
            lines: Vec::new(),
            key_width: 18,
            styled: false,
        }
    }

    pub fn title(&mut self, text: &str) -> &mut Self {
        let line = if self.styled {
            style(text).bold().to_string()
        } else {
            text.to_string()
        };
        self.lines.push(line);
        self.lines.push(String::new());
        self
    }

    pub fn section(&mut self, text: &str) -> &mut Self {
        let line = if self.styled {
            style(text).bold().to_string()
        } else {
            text.to_string()
        };
        self.lines.push(line);
        self.lines.push("-".repeat(text.chars().count().max(3)));
        self
    }

    pub fn kv(&mut self, key: &str, value: &str) -> &mut Self {
        let padded = format!("{key:width$}", width = self.key_width);
        let key = if self.styled {
            style(padded).dim().to_string()
        } else {
            padded
        };
        self.lines.push(format!("{key} {value}"));
        self
    }

    pub fn bullet(&mut self, text: &str) -> &mut Self {
        self.lines.push(format!("- {text}"));
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(String::new());
        self
    }

    pub fn push_line(&mut self, line: impl Into<String>) -> &mut Self {
        self.lines.push(line.into());
        self
    }

    #[must_use]
    pub fn build(self) -> String {
        self.lines.join("\n")
    }
}

pub fn emit_human(layout: HumanLayout) {
    println!("{}", layout.build());
}
