//! Model client abstraction used by the structured agent loop

mod ollama;

pub use ollama::OllamaModel;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use llm_core::{ChatMessage, ToolDefinition};
use serde_json::Value;

/// Which of the offered tools the model may select
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    /// Must call at least one of the offered tools; no text-only replies
    Any,
    /// Must call exactly this function
    Function(String),
}

impl ToolChoice {
    pub fn allows(&self, name: &str) -> bool {
        match self {
            ToolChoice::Any => true,
            ToolChoice::Function(only) => only == name,
        }
    }
}

/// A language-model backend
///
/// Implementations perform one request per call and never retry.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Ask for a reply shaped by `schema`; returns the raw payload, which the
    /// caller validates
    async fn complete_structured(
        &self,
        messages: &[ChatMessage],
        schema: &ToolDefinition,
    ) -> Result<Value>;

    /// Ask for an assistant turn that may request tool invocations
    async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        choice: &ToolChoice,
    ) -> Result<ChatMessage>;
}

#[async_trait]
impl<C: ModelClient + ?Sized> ModelClient for Arc<C> {
    async fn complete_structured(
        &self,
        messages: &[ChatMessage],
        schema: &ToolDefinition,
    ) -> Result<Value> {
        (**self).complete_structured(messages, schema).await
    }

    async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        choice: &ToolChoice,
    ) -> Result<ChatMessage> {
        (**self).complete_with_tools(messages, tools, choice).await
    }
}
