//! Bounded agent loop that ends in a structured answer

mod agent_loop;
mod state;

pub use agent_loop::StructuredAgent;
pub use state::{AgentConfig, RunOutcome, DEFAULT_MAX_EXECUTIONS, DEFAULT_MAX_TOOL_OUTPUT_LEN};
