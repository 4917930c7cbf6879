//! Agent configuration and per-run state

use llm_core::ChatMessage;

use crate::conversation::Conversation;

/// Default number of model turns per run
pub const DEFAULT_MAX_EXECUTIONS: usize = 10;

/// Default cap on a single tool message, in bytes
pub const DEFAULT_MAX_TOOL_OUTPUT_LEN: usize = 50_000;

/// Configuration for the agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum model turns per run, including the forced final turn; must be >= 1
    pub max_executions: usize,
    /// Tool output longer than this is truncated before it reaches the model
    pub max_tool_output_len: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_executions: DEFAULT_MAX_EXECUTIONS,
            max_tool_output_len: DEFAULT_MAX_TOOL_OUTPUT_LEN,
        }
    }
}

impl AgentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_executions(mut self, max: usize) -> Self {
        self.max_executions = max;
        self
    }

    pub fn with_max_tool_output_len(mut self, max: usize) -> Self {
        self.max_tool_output_len = max;
        self
    }
}

/// Mutable state of one run; never shared between runs
#[derive(Debug)]
pub(crate) struct LoopState {
    pub conversation: Conversation,
    pub iteration: usize,
    pub model_calls: usize,
    pub tool_invocations: usize,
    pub forced_completion: bool,
}

impl LoopState {
    pub fn new(conversation: Conversation) -> Self {
        Self {
            conversation,
            iteration: 0,
            model_calls: 0,
            tool_invocations: 0,
            forced_completion: false,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.conversation.messages()
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        self.conversation.push(message);
    }

    pub fn record_model_call(&mut self) {
        self.model_calls += 1;
    }

    pub fn record_tool_invocation(&mut self) {
        self.tool_invocations += 1;
    }

    pub fn increment_iteration(&mut self) {
        self.iteration += 1;
    }

    pub fn finish<T>(self, output: T) -> RunOutcome<T> {
        RunOutcome {
            output,
            conversation: self.conversation,
            model_calls: self.model_calls,
            tool_invocations: self.tool_invocations,
            forced_completion: self.forced_completion,
        }
    }
}

/// Result of a run together with how it was reached
#[derive(Debug, Clone)]
pub struct RunOutcome<T> {
    pub output: T,
    /// Full transcript, including the turn that carried the answer
    pub conversation: Conversation,
    pub model_calls: usize,
    /// Registered tools actually executed (successfully or not)
    pub tool_invocations: usize,
    /// Whether the answer came from the schema-only final turn
    pub forced_completion: bool,
}
