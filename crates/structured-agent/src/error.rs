//! Error types surfaced by the structured agent loop

use thiserror::Error;

/// Errors that escape a structured agent run
///
/// Tool failures and unknown tool names never appear here; they are turned
/// into tool messages so the model can adapt.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Invalid configuration, raised before any model call
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The final-answer call arrived without usable arguments, usually because
    /// the model hit its output-length ceiling
    #[error("malformed structured call for `{schema}`: {reason}")]
    MalformedStructuredCall { schema: String, reason: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The model client itself failed; model calls are never retried
    #[error(transparent)]
    Model(anyhow::Error),
}

/// A structured payload that does not satisfy its schema
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("`{schema}` expects a JSON object, got {found}")]
    NotAnObject { schema: String, found: &'static str },

    #[error("`{schema}` is missing required field `{field}`")]
    MissingField { schema: String, field: String },

    #[error("field `{field}` expects {expected}, got {found}")]
    WrongType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("field `{field}` must be one of [{allowed}], got {value}")]
    NotAllowed {
        field: String,
        allowed: String,
        value: String,
    },

    #[error("field `{field}` = {value} is out of range ({bounds})")]
    OutOfRange {
        field: String,
        value: String,
        bounds: String,
    },

    /// Payload passed the field checks but could not be decoded
    #[error("invalid `{schema}` payload: {message}")]
    Malformed { schema: String, message: String },

    /// Rule defined by the output type itself
    #[error("{0}")]
    Rule(String),
}

/// Short name of a JSON value's kind, for error messages
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;

    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
