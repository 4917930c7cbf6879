//! structured-agent: obtain a schema-validated answer from an LLM
//!
//! The caller supplies a conversation, an output schema and optionally some
//! tools. Without tools the model is asked once for a structured reply. With
//! tools the model may call them for a bounded number of turns, submitting
//! its answer by calling the schema itself; if it never does, a final turn
//! forces the schema call.

pub mod agent;
pub mod conversation;
pub mod error;
pub mod model;
pub mod schema;
pub mod tools;

pub use agent::{AgentConfig, RunOutcome, StructuredAgent};
pub use conversation::Conversation;
pub use error::{AgentError, ValidationError};
pub use model::{ModelClient, OllamaModel, ToolChoice};
pub use schema::{OutputSchema, RecordSchema, StructuredOutput, TypedSchema};
pub use tools::builtin::ReadFileTool;
pub use tools::registry::ToolRegistry;
pub use tools::{ParamType, ParameterProperty, ParameterSchema, Tool, ToolError};
