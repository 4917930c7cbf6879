//! [`ModelClient`] backed by Ollama's chat API

use anyhow::{Context, Result};
use async_trait::async_trait;
use llm_core::{
    parse_json_object, parse_json_tool_calls, ChatMessage, ChatOptions, ChatRequest, Config,
    OllamaClient, Role, ToolCall, ToolDefinition,
};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{ModelClient, ToolChoice};

/// Ollama chat model with fixed sampling options
#[derive(Debug, Clone)]
pub struct OllamaModel {
    client: OllamaClient,
    model: String,
    options: ChatOptions,
}

impl OllamaModel {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            options: ChatOptions::default(),
        }
    }

    /// Build from llm.toml settings (endpoint, timeout, model, temperature)
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = OllamaClient::with_timeout(config.ollama_url(), config.request_timeout())?;
        Ok(Self::new(client, config.agent.model.clone())
            .with_options(ChatOptions::default().with_temperature(config.agent.temperature)))
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn client(&self) -> &OllamaClient {
        &self.client
    }
}

#[async_trait]
impl ModelClient for OllamaModel {
    #[instrument(skip(self, messages, schema), fields(model = %self.model, schema = %schema.name()))]
    async fn complete_structured(
        &self,
        messages: &[ChatMessage],
        schema: &ToolDefinition,
    ) -> Result<Value> {
        let request = ChatRequest::new(&self.model, messages.to_vec())
            .with_format(schema.function.parameters.clone())
            .with_options(self.options.clone());

        let response = self.client.chat(&request).await?;
        let content = response.message.content.trim();

        serde_json::from_str::<Value>(content)
            .ok()
            .filter(Value::is_object)
            .or_else(|| parse_json_object(content))
            .with_context(|| format!("Model reply for `{}` is not a JSON object", schema.name()))
    }

    #[instrument(skip(self, messages, tools), fields(model = %self.model, tools = tools.len(), choice = ?choice))]
    async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        choice: &ToolChoice,
    ) -> Result<ChatMessage> {
        let permitted: Vec<ToolDefinition> = tools
            .iter()
            .filter(|t| choice.allows(t.name()))
            .cloned()
            .collect();

        if permitted.is_empty() {
            anyhow::bail!("Tool choice {:?} matches none of the offered tools", choice);
        }

        // Ollama has no tool_choice parameter, so the policy travels as a
        // trailing instruction that is never stored in the conversation
        let mut request_messages = messages.to_vec();
        request_messages.push(ChatMessage::system(selection_instruction(&permitted, choice)));

        let request = ChatRequest::new(&self.model, request_messages)
            .with_tools(permitted)
            .with_options(self.options.clone());

        let mut turn = self.client.chat(&request).await?.message;
        turn.role = Role::Assistant;
        recover_tool_calls(&mut turn, choice);

        if turn.tool_calls.is_empty() {
            warn!("Model replied without selecting a tool");
        }

        Ok(turn)
    }
}

fn selection_instruction(permitted: &[ToolDefinition], choice: &ToolChoice) -> String {
    match choice {
        ToolChoice::Any => format!(
            "You must respond by calling one of these tools: {}. Do not reply with plain text.",
            permitted
                .iter()
                .map(|t| t.name())
                .collect::<Vec<_>>()
                .join(", ")
        ),
        ToolChoice::Function(name) => format!(
            "You must respond by calling the `{}` tool with complete arguments. Do not call any other tool.",
            name
        ),
    }
}

/// Fill in tool calls for models that write them into the text content
///
/// Under `ToolChoice::Function`, content that does not name the required
/// function is taken as that function's arguments, so an answer with its own
/// `name` field is not mistaken for a call envelope.
fn recover_tool_calls(turn: &mut ChatMessage, choice: &ToolChoice) {
    if !turn.tool_calls.is_empty() {
        return;
    }

    let parsed = parse_json_tool_calls(&turn.content);

    match choice {
        ToolChoice::Any => {
            if let Some(calls) = parsed {
                debug!(count = calls.len(), "Parsed tool calls from content JSON");
                turn.tool_calls = calls;
            }
        }
        ToolChoice::Function(name) => {
            if let Some(calls) = parsed.filter(|calls| calls.iter().any(|c| c.name() == name)) {
                debug!(count = calls.len(), "Parsed tool calls from content JSON");
                turn.tool_calls = calls;
                return;
            }

            if let Some(arguments) = parse_json_object(&turn.content) {
                debug!(tool = %name, "Treating content JSON as arguments of the required tool");
                turn.tool_calls = vec![ToolCall::generated(name.clone(), arguments)];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defs() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new("collect_book_reviews", "Reviews", json!({"type": "object"})),
            ToolDefinition::new("BookOutput", "Answer", json!({"type": "object"})),
        ]
    }

    #[test]
    fn test_native_tool_calls_untouched() {
        let call = ToolCall::new("abc", "collect_book_reviews", json!({"book_title": "x"}));
        let mut turn = ChatMessage::assistant_with_tools(r#"{"name": "other", "arguments": {}}"#, vec![call.clone()]);

        recover_tool_calls(&mut turn, &ToolChoice::Any);
        assert_eq!(turn.tool_calls, vec![call]);
    }

    #[test]
    fn test_recover_calls_from_content() {
        let mut turn = ChatMessage::assistant(
            "```json\n{\"name\": \"collect_book_reviews\", \"arguments\": {\"book_title\": \"x\"}}\n```",
        );

        recover_tool_calls(&mut turn, &ToolChoice::Any);
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].name(), "collect_book_reviews");
    }

    #[test]
    fn test_bare_object_only_counts_for_required_function() {
        let content = r#"{"target_audience": "adult", "reading_level": 3}"#;

        let mut any_turn = ChatMessage::assistant(content);
        recover_tool_calls(&mut any_turn, &ToolChoice::Any);
        assert!(any_turn.tool_calls.is_empty());

        let mut forced_turn = ChatMessage::assistant(content);
        recover_tool_calls(&mut forced_turn, &ToolChoice::Function("BookOutput".to_string()));
        assert_eq!(forced_turn.tool_calls.len(), 1);
        assert_eq!(forced_turn.tool_calls[0].name(), "BookOutput");
        assert_eq!(forced_turn.tool_calls[0].function.arguments["reading_level"], json!(3));
    }

    #[test]
    fn test_forced_answer_with_name_field_is_not_a_call_envelope() {
        let choice = ToolChoice::Function("PersonOutput".to_string());
        let mut turn = ChatMessage::assistant(r#"{"name": "Ada Lovelace", "born": 1815}"#);

        recover_tool_calls(&mut turn, &choice);
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].name(), "PersonOutput");
        assert_eq!(
            turn.tool_calls[0].function.arguments,
            json!({"name": "Ada Lovelace", "born": 1815})
        );
    }

    #[test]
    fn test_forced_envelope_naming_required_function_is_kept() {
        let choice = ToolChoice::Function("PersonOutput".to_string());
        let mut turn = ChatMessage::assistant(
            r#"{"name": "PersonOutput", "arguments": {"name": "Ada Lovelace", "born": 1815}}"#,
        );

        recover_tool_calls(&mut turn, &choice);
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].name(), "PersonOutput");
        assert_eq!(turn.tool_calls[0].function.arguments["born"], json!(1815));
    }

    #[test]
    fn test_selection_instruction() {
        let any = selection_instruction(&defs(), &ToolChoice::Any);
        assert!(any.contains("collect_book_reviews, BookOutput"));

        let forced = selection_instruction(&defs()[1..], &ToolChoice::Function("BookOutput".to_string()));
        assert!(forced.contains("`BookOutput`"));
    }

    #[test]
    fn test_from_config_uses_agent_settings() {
        let config: Config = toml::from_str("[agent]\nmodel = \"qwen2.5:7b\"\ntemperature = 0.3\n").unwrap();
        let model = OllamaModel::from_config(&config).unwrap();
        assert_eq!(model.model(), "qwen2.5:7b");
        assert_eq!(model.options.temperature, Some(0.3));
        assert_eq!(model.client().base_url(), "http://127.0.0.1:11434");
    }
}
