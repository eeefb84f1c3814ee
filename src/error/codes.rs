//! Standardized error codes for machine-parseable output.
//!
//! Error codes follow a numeric taxonomy:
//! - 1xx: Retriever errors
//! - 2xx: Index errors
//! - 3xx: Config errors
//! - 4xx: Search errors
//! - 6xx: Storage errors

use serde::{Deserialize, Serialize};

/// Standardized error codes for JSON output.
///
/// Each variant maps to a numeric code (e.g., `NoRetrieverAvailable` -> E102).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================
    // Retriever errors (1xx)
    // ========================================
    /// E101: A single retriever could not serve the query
    RetrieverUnavailable,
    /// E102: Every retriever failed for the query
    NoRetrieverAvailable,
    /// E103: A retriever exceeded its time budget
    RetrieverTimeout,

    // ========================================
    // Index errors (2xx)
    // ========================================
    /// E202: Index does not match the model or shape expected by its retriever
    IndexMismatch,

    // ========================================
    // Config errors (3xx)
    // ========================================
    /// E302: Config file has invalid syntax or values
    ConfigInvalid,
    /// E304: Required config value is missing
    ConfigMissingRequired,

    // ========================================
    // Search errors (4xx)
    // ========================================
    /// E401: Search request has invalid parameters
    SearchRequestInvalid,

    // ========================================
    // Storage errors (6xx)
    // ========================================
    /// E601: Failed to read from disk
    StorageReadError,
    /// E605: Serialization/deserialization failed
    SerializationError,
}

impl ErrorCode {
    /// Numeric code for the variant.
    #[must_use]
    pub const fn numeric(&self) -> u16 {
        match self {
            Self::RetrieverUnavailable => 101,
            Self::NoRetrieverAvailable => 102,
            Self::RetrieverTimeout => 103,
            Self::IndexMismatch => 202,
            Self::ConfigInvalid => 302,
            Self::ConfigMissingRequired => 304,
            Self::SearchRequestInvalid => 401,
            Self::StorageReadError => 601,
            Self::SerializationError => 605,
        }
    }

    /// Category name used in structured output.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self.numeric() / 100 {
            1 => "retriever",
            2 => "index",
            3 => "config",
            4 => "search",
            6 => "storage",
            _ => "internal",
        }
    }

    /// Whether the caller can reasonably retry or fix the condition.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::IndexMismatch)
    }

    /// Default recovery hint.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::RetrieverUnavailable => {
                "Check that the retriever's index was loaded; results are degraded until it is"
            }
            Self::NoRetrieverAvailable => {
                "Load at least one index or raise engine.query_timeout_ms"
            }
            Self::RetrieverTimeout => "Raise engine.retriever_timeout_ms",
            Self::IndexMismatch => {
                "Rebuild the embedding matrix with the same model used to encode queries"
            }
            Self::ConfigInvalid => "Run `normativa config` to inspect the effective values",
            Self::ConfigMissingRequired => "Set the missing key in config.toml",
            Self::SearchRequestInvalid => "Use k > 0, k_rrf > 0 and non-negative weights",
            Self::StorageReadError => "Check the file path and permissions",
            Self::SerializationError => "Check that the input is valid JSON/TOML",
        }
    }

    /// Documentation link, when one exists.
    #[must_use]
    pub fn help_url(&self) -> Option<String> {
        None
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E{}", self.numeric())
    }
}
