//! Error handling for normativa.
//!
//! This module provides:
//! - [`NormError`]: The main error enum for all operations
//! - [`ErrorCode`]: Standardized error codes for machine parsing
//! - [`StructuredError`]: Rich error type with suggestion and context

mod codes;
mod suggestions;

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use codes::ErrorCode;
pub use suggestions::suggest_for_error;

/// Main error type.
#[derive(Error, Debug)]
pub enum NormError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing required config: {0}")]
    MissingConfig(String),

    #[error("Invalid search request: {0}")]
    InvalidRequest(String),

    #[error("Retriever '{retriever}' unavailable: {reason}")]
    RetrieverUnavailable { retriever: String, reason: String },

    #[error("No retriever available (attempted: {})", .attempted.join(", "))]
    NoRetrieverAvailable { attempted: Vec<String> },

    #[error("Index mismatch: {0}")]
    IndexMismatch(String),

    #[error("Retriever '{retriever}' timed out")]
    Timeout { retriever: String },
}

impl NormError {
    /// Shorthand for a retriever-scoped unavailability.
    pub fn unavailable(retriever: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RetrieverUnavailable {
            retriever: retriever.into(),
            reason: reason.into(),
        }
    }

    /// Get the error code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Io(_) => ErrorCode::StorageReadError,
            Self::Json(_) | Self::Serialization(_) => ErrorCode::SerializationError,
            Self::Config(_) => ErrorCode::ConfigInvalid,
            Self::MissingConfig(_) => ErrorCode::ConfigMissingRequired,
            Self::InvalidRequest(_) => ErrorCode::SearchRequestInvalid,
            Self::RetrieverUnavailable { .. } => ErrorCode::RetrieverUnavailable,
            Self::NoRetrieverAvailable { .. } => ErrorCode::NoRetrieverAvailable,
            Self::IndexMismatch(_) => ErrorCode::IndexMismatch,
            Self::Timeout { .. } => ErrorCode::RetrieverTimeout,
        }
    }

    /// Get context information for this error as JSON.
    #[must_use]
    pub fn context(&self) -> Option<Value> {
        match self {
            Self::RetrieverUnavailable { retriever, reason } => {
                Some(serde_json::json!({ "retriever": retriever, "reason": reason }))
            }
            Self::NoRetrieverAvailable { attempted } => {
                Some(serde_json::json!({ "attempted": attempted }))
            }
            Self::MissingConfig(key) => Some(serde_json::json!({ "config_key": key })),
            Self::Timeout { retriever } => Some(serde_json::json!({ "retriever": retriever })),
            _ => None,
        }
    }

    /// Convert this error to a structured error.
    #[must_use]
    pub fn to_structured(&self) -> StructuredError {
        StructuredError::from_norm_error(self)
    }
}

/// A structured error with machine-readable code, suggestion, and context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// The error code (e.g., "NO_RETRIEVER_AVAILABLE")
    pub code: ErrorCode,

    /// The numeric error code (e.g., 102)
    pub numeric_code: u16,

    /// Human-readable error message
    pub message: String,

    /// Actionable suggestion for recovery
    pub suggestion: String,

    /// Additional context for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    /// Whether this error is potentially recoverable by the user
    pub recoverable: bool,

    /// URL to documentation about this error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_url: Option<String>,

    /// Error category (e.g., "retriever", "config")
    pub category: String,
}

impl StructuredError {
    /// Create a new structured error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            numeric_code: code.numeric(),
            suggestion: code.suggestion().to_string(),
            context: None,
            recoverable: code.is_recoverable(),
            help_url: code.help_url(),
            category: code.category().to_string(),
            code,
            message: message.into(),
        }
    }

    /// Create a structured error from a [`NormError`].
    #[must_use]
    pub fn from_norm_error(err: &NormError) -> Self {
        let code = err.code();
        let context = err.context();
        Self {
            suggestion: suggest_for_error(code, context.as_ref()),
            context,
            ..Self::new(code, err.to_string())
        }
    }

    /// Add context to this error.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Set a custom suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<NormError> for StructuredError {
    fn from(err: NormError) -> Self {
        Self::from_norm_error(&err)
    }
}

impl From<&NormError> for StructuredError {
    fn from(err: &NormError) -> Self {
        Self::from_norm_error(err)
    }
}

/// Result type alias using NormError.
pub type Result<T> = std::result::Result<T, NormError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_norm_error_code_mapping() {
        assert_eq!(
            NormError::unavailable("bm25", "index not loaded").code(),
            ErrorCode::RetrieverUnavailable
        );
        assert_eq!(
            NormError::NoRetrieverAvailable {
                attempted: vec!["bm25".into()]
            }
            .code(),
            ErrorCode::NoRetrieverAvailable
        );
        assert_eq!(NormError::Config("bad".into()).code(), ErrorCode::ConfigInvalid);
    }

    #[test]
    fn test_timeout_is_retriever_scoped() {
        let err = NormError::Timeout {
            retriever: "dense".into(),
        };
        assert_eq!(err.to_string(), "Retriever 'dense' timed out");
        let structured = err.to_structured();
        assert_eq!(structured.code, ErrorCode::RetrieverTimeout);
        assert!(structured.suggestion.contains("dense"));
    }

    #[test]
    fn test_no_retriever_message_lists_attempts() {
        let err = NormError::NoRetrieverAvailable {
            attempted: vec!["bm25".into(), "tfidf".into(), "dense".into()],
        };
        assert_eq!(
            err.to_string(),
            "No retriever available (attempted: bm25, tfidf, dense)"
        );
    }

    #[test]
    fn test_structured_error_carries_context() {
        let err = NormError::unavailable("dense", "model mismatch");
        let structured = err.to_structured();

        assert_eq!(structured.code, ErrorCode::RetrieverUnavailable);
        assert_eq!(structured.numeric_code, 101);
        assert_eq!(structured.category, "retriever");
        assert!(structured.suggestion.contains("mismatch"));
        let ctx = structured.context.unwrap();
        assert_eq!(ctx.get("retriever").unwrap(), "dense");
    }

    #[test]
    fn test_structured_error_serialization() {
        let err = StructuredError::new(ErrorCode::NoRetrieverAvailable, "all failed");
        let json = serde_json::to_string(&err).unwrap();

        assert!(json.contains("NO_RETRIEVER_AVAILABLE"));
        assert!(json.contains("\"numeric_code\":102"));
        assert!(json.contains("\"category\":\"retriever\""));
    }

    #[test]
    fn test_structured_error_display() {
        let err = StructuredError::new(ErrorCode::ConfigInvalid, "k1 must be >= 0");
        assert_eq!(format!("{err}"), "[E302] k1 must be >= 0");
    }

    #[test]
    fn test_custom_suggestion_overrides_default() {
        let err = StructuredError::new(ErrorCode::RetrieverTimeout, "slow")
            .with_suggestion("retry later");
        assert_eq!(err.suggestion, "retry later");
    }
}
