//! Tool registry and the per-run dispatch table

use std::collections::HashMap;
use std::sync::Arc;

use llm_core::{ToolCall, ToolDefinition};
use tracing::{debug, info, instrument, warn};

use super::{render_output, truncate_output, Tool};
use crate::error::AgentError;

/// Registry of available tools, in registration order
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.push(Arc::new(tool));
    }

    /// Register an already shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// List all registered tool names
    pub fn list_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Get tool definitions for the LLM API
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.iter()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.list_names())
            .finish()
    }
}

/// What a registered name resolves to during a run
#[derive(Clone)]
pub enum Invocable {
    /// An external tool to execute
    Tool(Arc<dyn Tool>),
    /// The output schema; calling it submits the final answer
    Terminal,
}

/// How a single tool request was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Completed,
    Failed,
    UnknownTool,
}

/// Content of the tool message produced for one request
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub status: DispatchStatus,
    pub content: String,
}

/// Name-keyed dispatch table built once per run: every registered tool plus
/// the output schema as the terminal entry
pub struct ToolSet {
    entries: HashMap<String, Invocable>,
    definitions: Vec<ToolDefinition>,
    max_output_len: usize,
}

impl ToolSet {
    /// Build the table, rejecting duplicate tool names and any tool that
    /// shares the schema's name
    pub fn build(
        registry: &ToolRegistry,
        schema: &ToolDefinition,
        max_output_len: usize,
    ) -> Result<Self, AgentError> {
        let mut entries = HashMap::with_capacity(registry.len() + 1);
        let mut definitions = Vec::with_capacity(registry.len() + 1);

        entries.insert(schema.name().to_string(), Invocable::Terminal);

        for tool in registry.iter() {
            let name = tool.name();
            if name == schema.name() {
                return Err(AgentError::InvalidArgument(format!(
                    "tool `{}` has the same name as the output schema",
                    name
                )));
            }
            if entries.insert(name.to_string(), Invocable::Tool(Arc::clone(tool))).is_some() {
                return Err(AgentError::InvalidArgument(format!(
                    "tool `{}` is registered more than once",
                    name
                )));
            }
            definitions.push(tool.to_definition());
        }

        definitions.push(schema.clone());

        Ok(Self {
            entries,
            definitions,
            max_output_len,
        })
    }

    /// Definitions offered to the model: tools first, then the schema
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn get(&self, name: &str) -> Option<&Invocable> {
        self.entries.get(name)
    }

    /// First request in a turn that targets the terminal entry
    pub fn terminal_call<'a>(&self, calls: &'a [ToolCall]) -> Option<&'a ToolCall> {
        calls
            .iter()
            .find(|call| matches!(self.get(call.name()), Some(Invocable::Terminal)))
    }

    /// Resolve and run one request; failures become message content
    #[instrument(skip(self, call), fields(tool = %call.name(), call_id = %call.id))]
    pub async fn dispatch(&self, call: &ToolCall) -> Dispatched {
        let tool = match self.get(call.name()) {
            Some(Invocable::Tool(tool)) => tool,
            Some(Invocable::Terminal) => {
                return Dispatched {
                    status: DispatchStatus::Failed,
                    content: format!(
                        "Error: `{}` submits the final answer and cannot be executed as a tool",
                        call.name()
                    ),
                };
            }
            None => {
                warn!(tool = %call.name(), "Model requested an unknown tool");
                return Dispatched {
                    status: DispatchStatus::UnknownTool,
                    content: format!(
                        "Error: unknown tool '{}'. Available tools: {}",
                        call.name(),
                        self.definitions
                            .iter()
                            .map(|d| d.name())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                };
            }
        };

        let mut args = call.function.arguments.clone();
        let schema = tool.parameters_schema();
        schema.coerce_integers(&mut args);
        let checked = schema
            .validate(call.name(), &args)
            .map_err(super::ToolError::from);

        debug!("Executing tool");
        let result = match checked {
            Ok(()) => tool.execute(&args).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(output) => {
                let content = truncate_output(render_output(&output), self.max_output_len);
                info!(output_len = content.len(), "Tool executed successfully");
                Dispatched {
                    status: DispatchStatus::Completed,
                    content,
                }
            }
            Err(e) => {
                warn!(error = %e, "Tool execution failed");
                Dispatched {
                    status: DispatchStatus::Failed,
                    content: format!("Error: {}", e),
                }
            }
        }
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSet")
            .field(
                "entries",
                &self.definitions.iter().map(|d| d.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
