//! Context-aware error suggestions.
//!
//! Refines the static hints in [`ErrorCode::suggestion`] using the JSON
//! context attached to an error.

use serde_json::Value;

use super::codes::ErrorCode;

/// Suggestion tailored to the error context, falling back to the code's default.
pub fn suggest_for_error(code: ErrorCode, context: Option<&Value>) -> String {
    match code {
        ErrorCode::RetrieverUnavailable => suggest_retriever_unavailable(context),
        ErrorCode::NoRetrieverAvailable => suggest_no_retriever(context),
        ErrorCode::ConfigMissingRequired => suggest_missing_config(context),
        ErrorCode::RetrieverTimeout => suggest_retriever_timeout(context),
        _ => code.suggestion().to_string(),
    }
}

fn context_str<'a>(context: Option<&'a Value>, key: &str) -> Option<&'a str> {
    context?.get(key)?.as_str()
}

fn suggest_retriever_unavailable(context: Option<&Value>) -> String {
    let Some(name) = context_str(context, "retriever") else {
        return ErrorCode::RetrieverUnavailable.suggestion().to_string();
    };
    match context_str(context, "reason") {
        Some(reason) if reason.contains("timed out") => {
            format!("Retriever '{name}' timed out; raise engine.retriever_timeout_ms")
        }
        Some(reason) if reason.contains("model") => format!(
            "Retriever '{name}' has an embedding model mismatch; re-embed the corpus with the query encoder"
        ),
        _ => format!("Load the '{name}' index; results are degraded until it is available"),
    }
}

fn suggest_no_retriever(context: Option<&Value>) -> String {
    let attempted: Vec<&str> = context
        .and_then(|ctx| ctx.get("attempted"))
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if attempted.is_empty() {
        return ErrorCode::NoRetrieverAvailable.suggestion().to_string();
    }
    format!(
        "None of [{}] answered; load at least one index or raise engine.query_timeout_ms",
        attempted.join(", ")
    )
}

fn suggest_missing_config(context: Option<&Value>) -> String {
    context_str(context, "config_key").map_or_else(
        || ErrorCode::ConfigMissingRequired.suggestion().to_string(),
        |key| format!("Set '{key}' in config.toml or pass it on the command line"),
    )
}

fn suggest_retriever_timeout(context: Option<&Value>) -> String {
    context_str(context, "retriever").map_or_else(
        || ErrorCode::RetrieverTimeout.suggestion().to_string(),
        |name| format!("Retriever '{name}' timed out; raise engine.retriever_timeout_ms"),
    )
}
