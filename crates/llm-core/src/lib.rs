//! llm-core: Shared library for talking to a local LLM
//!
//! Provides:
//! - Configuration loading (llm.toml)
//! - Chat message and tool-call types
//! - Ollama chat client (tool calling and JSON-schema structured output)
//! - Recovery of tool calls that models emit as plain JSON text

pub mod config;
pub mod ollama;
pub mod tool_calls;

pub use config::{AgentSettings, Config, OllamaConfig};
pub use ollama::{
    ChatMessage, ChatOptions, ChatRequest, ChatResponse, FunctionCall, FunctionDefinition, Model,
    OllamaClient, OllamaStatus, Role, ToolCall, ToolDefinition,
};
pub use tool_calls::{parse_json_object, parse_json_tool_calls};
