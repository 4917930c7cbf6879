//! CLI commands implementation

use anyhow::{Context, Result};
use llm_core::{ChatMessage, Config, OllamaClient, OllamaStatus};
use serde_json::Value;
use std::io::{self, Read};
use std::path::Path;
use structured_agent::{
    Conversation, OllamaModel, OutputSchema, ReadFileTool, RecordSchema, StructuredAgent,
};
use tracing::debug;

use crate::RunArgs;

// ANSI color codes
const GREEN: &str = "\x1b[92m";
const RED: &str = "\x1b[91m";
const YELLOW: &str = "\x1b[93m";
const BLUE: &str = "\x1b[94m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Load llm.toml (or defaults) and apply endpoint overrides
pub fn load_config(host: Option<String>, port: Option<u16>) -> Result<Config> {
    let mut config = Config::load_or_default()?;
    apply_endpoint_overrides(&mut config, host, port);
    Ok(config)
}

fn apply_endpoint_overrides(config: &mut Config, host: Option<String>, port: Option<u16>) {
    if let Some(host) = host {
        config.ollama.host = host;
    }
    if let Some(port) = port {
        config.ollama.port = port;
    }
}

/// Run the agent loop against Ollama and print the result
pub async fn run(config: &Config, args: RunArgs) -> Result<()> {
    let schema = RecordSchema::load(&args.schema)?;

    let stdin_content = if args.stdin {
        let mut content = String::new();
        io::stdin()
            .read_to_string(&mut content)
            .context("Failed to read stdin")?;
        Some(content)
    } else {
        None
    };

    let conversation = build_conversation(
        args.system.as_deref(),
        &args.prompt.join(" "),
        stdin_content.as_deref(),
    )?;

    let mut config = config.clone();
    if let Some(model) = args.model {
        config.agent.model = model;
    }
    if let Some(temperature) = args.temperature {
        config.agent.temperature = temperature;
    }

    let model = OllamaModel::from_config(&config)?;
    let mut agent = StructuredAgent::new(model)
        .with_max_executions(args.max_executions.unwrap_or(config.agent.max_executions));

    if let Some(root) = &args.read_root {
        agent = agent.with_tool(ReadFileTool::new(root)?);
    }

    debug!(
        model = %config.agent.model,
        schema = %schema.name(),
        tools = agent.registry().len(),
        "Starting run"
    );

    let outcome = agent
        .run_with_outcome(conversation, &schema)
        .await
        .with_context(|| format!("Run for schema `{}` failed", schema.name()))?;

    if args.transcript {
        eprint!("{}", render_transcript(outcome.conversation.messages()));
        eprintln!(
            "{}model calls: {}, tool invocations: {}, forced: {}{}",
            DIM, outcome.model_calls, outcome.tool_invocations, outcome.forced_completion, RESET
        );
    }

    println!("{}", serde_json::to_string_pretty(&Value::Object(outcome.output))?);
    Ok(())
}

/// Print the tool definition a schema file is exposed as
pub fn schema(path: &Path) -> Result<()> {
    let schema = RecordSchema::load(path)?;
    println!("{}", serde_json::to_string_pretty(&schema.to_definition())?);
    Ok(())
}

/// Show Ollama status and available models
pub async fn status(config: &Config) -> Result<()> {
    let client = OllamaClient::with_timeout(config.ollama_url(), config.request_timeout())?;

    println!("{}Ollama Status{}", BOLD, RESET);
    println!("  Endpoint: {}", config.ollama_url());
    println!("  Model: {}", config.agent.model);

    match client.status().await {
        OllamaStatus::Running => println!("  Status: {}running{}", GREEN, RESET),
        OllamaStatus::Stopped => {
            println!("  Status: {}not reachable{}", RED, RESET);
            println!("\n  Start with: {}ollama serve{}", BLUE, RESET);
            return Ok(());
        }
    }

    match client.list_models().await {
        Ok(models) => {
            println!("\n{}Models ({}){}", BOLD, models.len(), RESET);
            if models.is_empty() {
                println!("  {}No models available{}", YELLOW, RESET);
                println!("  Run: {}ollama pull {}{}", BLUE, config.agent.model, RESET);
            }
            for m in models {
                let marker = if m.name == config.agent.model
                    || m.name.strip_suffix(":latest") == Some(config.agent.model.as_str())
                {
                    " (configured)"
                } else {
                    ""
                };
                println!("  - {} ({}){}", m.name, m.size_human(), marker);
            }
        }
        Err(e) => println!("  {}Error listing models: {}{}", RED, e, RESET),
    }

    Ok(())
}

/// `[system?, user]`, with stdin appended to the prompt
fn build_conversation(
    system: Option<&str>,
    prompt: &str,
    stdin_content: Option<&str>,
) -> Result<Conversation> {
    let mut user = prompt.trim().to_string();
    if let Some(content) = stdin_content.filter(|c| !c.trim().is_empty()) {
        if !user.is_empty() {
            user.push_str("\n\n");
        }
        user.push_str(content.trim_end());
    }

    if user.is_empty() {
        anyhow::bail!("No prompt given; pass prompt text or use --stdin");
    }

    let mut conversation = Conversation::new();
    if let Some(system) = system {
        conversation = conversation.with_system(system);
    }
    Ok(conversation.with_user(user))
}

fn render_transcript(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for message in messages {
        out.push_str(&format!("{}[{}]{}", BOLD, message.role, RESET));
        if let Some(id) = &message.tool_call_id {
            out.push_str(&format!(" {}({}){}", DIM, id, RESET));
        }
        out.push('\n');
        if !message.content.is_empty() {
            out.push_str(&message.content);
            out.push('\n');
        }
        for call in &message.tool_calls {
            out.push_str(&format!(
                "  -> {}({})\n",
                call.name(),
                call.function.arguments
            ));
        }
    }
    out
}
