//! Output schemas: the contract a run's final answer must satisfy
//!
//! A schema is sent to the model twice over: as the JSON Schema for
//! structured replies, and as a pseudo-tool whose call *is* the answer.

use std::marker::PhantomData;
use std::path::Path;

use anyhow::Context;
use llm_core::ToolDefinition;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::tools::ParameterSchema;

/// A named, fielded contract with a validator
pub trait OutputSchema: Send + Sync {
    /// Value produced from a validated payload
    type Output: Send;

    /// Identifier, also used as the pseudo-tool name
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> &ParameterSchema;

    /// Validate a payload and build the output from it
    fn parse(&self, payload: Value) -> Result<Self::Output, ValidationError>;

    /// The schema exposed as a callable tool
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters().to_value())
    }
}

/// Schema assembled at runtime, e.g. loaded from a TOML file
///
/// ```toml
/// name = "BookOutput"
/// description = "Audience and reading level of a book"
///
/// [parameters]
/// required = ["target_audience", "reading_level"]
///
/// [parameters.properties.reading_level]
/// type = "integer"
/// minimum = 1
/// maximum = 5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: ParameterSchema,
}

impl RecordSchema {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Parse a schema from TOML text
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let schema: Self = toml::from_str(content).context("Failed to parse schema")?;
        schema.check()?;
        Ok(schema)
    }

    /// Load a schema from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema {}", path.display()))?;

        Self::from_toml_str(&content).with_context(|| format!("Invalid schema {}", path.display()))
    }

    fn check(&self) -> anyhow::Result<()> {
        let valid_name = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid_name {
            anyhow::bail!(
                "schema name {:?} must be non-empty and use only letters, digits, '_' or '-'",
                self.name
            );
        }

        if let Some(missing) = self
            .parameters
            .required
            .iter()
            .find(|field| !self.parameters.properties.contains_key(*field))
        {
            anyhow::bail!("required field `{}` has no property definition", missing);
        }

        Ok(())
    }
}

impl OutputSchema for RecordSchema {
    type Output = Map<String, Value>;

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ParameterSchema {
        &self.parameters
    }

    fn parse(&self, mut payload: Value) -> Result<Self::Output, ValidationError> {
        self.parameters.coerce_integers(&mut payload);
        self.parameters.validate(&self.name, &payload)?;

        match payload {
            Value::Object(map) => Ok(map),
            // validate() already rejected non-objects
            other => Err(ValidationError::NotAnObject {
                schema: self.name.clone(),
                found: crate::error::json_kind(&other),
            }),
        }
    }
}

/// A Rust type that can be requested as a run's final answer
pub trait StructuredOutput: DeserializeOwned + Send {
    /// Identifier, also used as the pseudo-tool name
    fn name() -> &'static str;

    fn description() -> &'static str;

    fn parameters() -> ParameterSchema;

    /// Rules the field schema cannot express
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// [`OutputSchema`] adapter for a [`StructuredOutput`] type
pub struct TypedSchema<T> {
    parameters: ParameterSchema,
    _output: PhantomData<fn() -> T>,
}

impl<T: StructuredOutput> TypedSchema<T> {
    pub fn new() -> Self {
        Self {
            parameters: T::parameters(),
            _output: PhantomData,
        }
    }
}

impl<T: StructuredOutput> Default for TypedSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: StructuredOutput> OutputSchema for TypedSchema<T> {
    type Output = T;

    fn name(&self) -> &str {
        T::name()
    }

    fn description(&self) -> &str {
        T::description()
    }

    fn parameters(&self) -> &ParameterSchema {
        &self.parameters
    }

    fn parse(&self, mut payload: Value) -> Result<T, ValidationError> {
        self.parameters.coerce_integers(&mut payload);
        self.parameters.validate(T::name(), &payload)?;

        let output: T = serde_json::from_value(payload).map_err(|e| ValidationError::Malformed {
            schema: T::name().to_string(),
            message: e.to_string(),
        })?;
        output.validate()?;

        Ok(output)
    }
}
