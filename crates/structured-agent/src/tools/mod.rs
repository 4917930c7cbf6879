//! Tool framework for structured agent runs
//!
//! Tools are named, schema-typed callables the model may ask the loop to
//! invoke on its behalf.

pub mod builtin;
pub mod registry;

use async_trait::async_trait;
use llm_core::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::error::{json_kind, ValidationError};

/// Failure of a single tool invocation
///
/// Never escapes the loop: it is rendered into the tool message so the model
/// can retry with other arguments or pick another tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(#[from] ValidationError),

    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// JSON type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            // 3.0 is accepted as an integer, 3.5 is not
            ParamType::Integer => match value {
                Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
                _ => false,
            },
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

/// Schema for a single parameter or output field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterProperty {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Allowed values (strings only)
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    /// Inclusive lower bound (integers and numbers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<Number>,
    /// Inclusive upper bound (integers and numbers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterProperty {
    fn of(param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            param_type,
            description: description.into(),
            enum_values: None,
            minimum: None,
            maximum: None,
            default: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::of(ParamType::String, description)
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::of(ParamType::Integer, description)
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self::of(ParamType::Number, description)
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::of(ParamType::Boolean, description)
    }

    pub fn array(description: impl Into<String>) -> Self {
        Self::of(ParamType::Array, description)
    }

    pub fn object(description: impl Into<String>) -> Self {
        Self::of(ParamType::Object, description)
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_range(mut self, minimum: impl Into<Number>, maximum: impl Into<Number>) -> Self {
        self.minimum = Some(minimum.into());
        self.maximum = Some(maximum.into());
        self
    }

    pub fn with_minimum(mut self, minimum: impl Into<Number>) -> Self {
        self.minimum = Some(minimum.into());
        self
    }

    pub fn with_maximum(mut self, maximum: impl Into<Number>) -> Self {
        self.maximum = Some(maximum.into());
        self
    }

    /// Check one present, non-null value against this property
    fn check(&self, field: &str, value: &Value) -> Result<(), ValidationError> {
        if !self.param_type.accepts(value) {
            return Err(ValidationError::WrongType {
                field: field.to_string(),
                expected: self.param_type.as_str(),
                found: json_kind(value),
            });
        }

        if let (Some(allowed), Some(text)) = (&self.enum_values, value.as_str()) {
            if !allowed.iter().any(|a| a == text) {
                return Err(ValidationError::NotAllowed {
                    field: field.to_string(),
                    allowed: allowed.join(", "),
                    value: value.to_string(),
                });
            }
        }

        if let Some(n) = value.as_f64() {
            let below = self.minimum.as_ref().and_then(Number::as_f64).is_some_and(|min| n < min);
            let above = self.maximum.as_ref().and_then(Number::as_f64).is_some_and(|max| n > max);
            if below || above {
                return Err(ValidationError::OutOfRange {
                    field: field.to_string(),
                    value: value.to_string(),
                    bounds: self.bounds(),
                });
            }
        }

        Ok(())
    }

    fn bounds(&self) -> String {
        match (&self.minimum, &self.maximum) {
            (Some(min), Some(max)) => format!("{} ..= {}", min, max),
            (Some(min), None) => format!(">= {}", min),
            (None, Some(max)) => format!("<= {}", max),
            (None, None) => "unbounded".to_string(),
        }
    }
}

fn object_type() -> String {
    "object".to_string()
}

/// Schema describing an arguments object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Type is always "object"
    #[serde(rename = "type", default = "object_type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, ParameterProperty>,
    /// Required parameter names
    #[serde(default)]
    pub required: Vec<String>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self {
            schema_type: object_type(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, prop: ParameterProperty) -> Self {
        self.properties.insert(name.into(), prop);
        self
    }

    pub fn with_required(mut self, name: impl Into<String>, prop: ParameterProperty) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), prop);
        self.required.push(name);
        self
    }

    /// JSON Schema form, as sent to the model
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Rewrite integral floats (`3.0`) in integer fields as integers
    pub fn coerce_integers(&self, value: &mut Value) {
        let Some(object) = value.as_object_mut() else {
            return;
        };

        for (field, prop) in &self.properties {
            if prop.param_type != ParamType::Integer {
                continue;
            }
            if let Some(slot) = object.get_mut(field) {
                if let Some(f) = slot.as_f64().filter(|f| slot.is_f64() && f.fract() == 0.0) {
                    if f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                        *slot = Value::from(f as i64);
                    }
                }
            }
        }
    }

    /// Validate an arguments object against this schema
    ///
    /// Required fields must be present and non-null, present fields must match
    /// their declared type, enum and range. Unknown fields are ignored.
    pub fn validate(&self, schema: &str, value: &Value) -> Result<(), ValidationError> {
        let object = value.as_object().ok_or_else(|| ValidationError::NotAnObject {
            schema: schema.to_string(),
            found: json_kind(value),
        })?;

        for field in &self.required {
            if object.get(field).map_or(true, Value::is_null) {
                return Err(ValidationError::MissingField {
                    schema: schema.to_string(),
                    field: field.clone(),
                });
            }
        }

        for (field, prop) in &self.properties {
            match object.get(field) {
                Some(Value::Null) | None => {}
                Some(value) => prop.check(field, value)?,
            }
        }

        Ok(())
    }
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// The Tool trait that all tools must implement
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name
    fn name(&self) -> &str;

    /// Get a description of what the tool does
    fn description(&self) -> &str;

    /// Get the parameter schema
    fn parameters_schema(&self) -> ParameterSchema;

    /// Execute the tool with the given arguments
    async fn execute(&self, args: &Value) -> Result<Value, ToolError>;

    /// Convert to a tool definition for the LLM
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters_schema().to_value())
    }
}

/// Render a tool's output as message content
///
/// Strings are passed through verbatim; any other JSON value is serialized.
pub fn render_output(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Truncate text to at most `max_len` bytes on a char boundary
pub fn truncate_output(output: String, max_len: usize) -> String {
    if output.len() <= max_len {
        return output;
    }

    let safe_end = output
        .char_indices()
        .take_while(|(idx, c)| idx + c.len_utf8() <= max_len)
        .last()
        .map(|(idx, c)| idx + c.len_utf8())
        .unwrap_or(0);

    format!(
        "{}\n\n[Output truncated to {} bytes]",
        &output[..safe_end],
        safe_end
    )
}
