//! Structured agent loop implementation

use llm_core::{ChatMessage, ToolCall, ToolDefinition};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::state::{AgentConfig, LoopState, RunOutcome};
use crate::conversation::Conversation;
use crate::error::AgentError;
use crate::model::{ModelClient, ToolChoice};
use crate::schema::OutputSchema;
use crate::tools::registry::{DispatchStatus, ToolRegistry, ToolSet};
use crate::tools::Tool;

/// Drives a model, and optionally tools, to a schema-validated answer
///
/// Without tools a run is a single structured request. With tools the schema
/// is offered as one more callable: every free turn must call something, a
/// call to the schema ends the run, and after `max_executions - 1` free turns
/// a final turn may call nothing but the schema.
pub struct StructuredAgent<C> {
    client: C,
    registry: ToolRegistry,
    config: AgentConfig,
}

impl<C: ModelClient> StructuredAgent<C> {
    /// Create an agent without tools and with default limits
    pub fn new(client: C) -> Self {
        Self {
            client,
            registry: ToolRegistry::new(),
            config: AgentConfig::default(),
        }
    }

    pub fn with_tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.registry.register(tool);
        self
    }

    /// Replace the tool registry
    pub fn with_tools(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_max_executions(mut self, max: usize) -> Self {
        self.config.max_executions = max;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Run the loop and return the validated answer
    pub async fn run<S: OutputSchema>(
        &self,
        conversation: Conversation,
        schema: &S,
    ) -> Result<S::Output, AgentError> {
        self.run_with_outcome(conversation, schema)
            .await
            .map(|outcome| outcome.output)
    }

    /// Run the loop and return the answer with its transcript and counters
    #[instrument(skip_all, fields(schema = %schema.name(), tools = self.registry.len(), max_executions = self.config.max_executions))]
    pub async fn run_with_outcome<S: OutputSchema>(
        &self,
        conversation: Conversation,
        schema: &S,
    ) -> Result<RunOutcome<S::Output>, AgentError> {
        let max_executions = self.config.max_executions;
        if max_executions < 1 {
            return Err(AgentError::InvalidArgument(format!(
                "max_executions must be at least 1, got {}",
                max_executions
            )));
        }

        let definition = schema.to_definition();
        let mut state = LoopState::new(conversation);
        info!(messages = state.messages().len(), "Starting structured agent run");

        if self.registry.is_empty() {
            return self.complete_without_tools(state, schema, &definition).await;
        }

        let tool_set = ToolSet::build(&self.registry, &definition, self.config.max_tool_output_len)?;

        while state.iteration + 1 < max_executions {
            state.increment_iteration();

            let turn = self
                .request_turn(&mut state, tool_set.definitions(), &ToolChoice::Any)
                .await?;
            debug!(
                iteration = state.iteration,
                tool_calls = turn.tool_calls.len(),
                "Model turn received"
            );

            if let Some(call) = tool_set.terminal_call(&turn.tool_calls) {
                let output = accept_answer(schema, call)?;
                state.add_message(turn);
                info!(
                    iterations = state.iteration,
                    model_calls = state.model_calls,
                    tool_invocations = state.tool_invocations,
                    "Model submitted the structured answer"
                );
                return Ok(state.finish(output));
            }

            let calls = turn.tool_calls.clone();
            state.add_message(turn);

            for call in &calls {
                let dispatched = tool_set.dispatch(call).await;
                if dispatched.status != DispatchStatus::UnknownTool {
                    state.record_tool_invocation();
                }
                state.add_message(ChatMessage::tool_result(call.id.clone(), dispatched.content));
            }
        }

        warn!(
            max_executions,
            tool_invocations = state.tool_invocations,
            "No answer within the turn budget, forcing structured completion"
        );
        state.forced_completion = true;

        let forced = ToolChoice::Function(definition.name().to_string());
        let turn = self
            .request_turn(&mut state, std::slice::from_ref(&definition), &forced)
            .await?;

        let call = tool_set
            .terminal_call(&turn.tool_calls)
            .ok_or_else(|| AgentError::MalformedStructuredCall {
                schema: schema.name().to_string(),
                reason: "the final turn did not call the schema".to_string(),
            })?;
        let output = accept_answer(schema, call)?;
        state.add_message(turn);

        info!(
            model_calls = state.model_calls,
            tool_invocations = state.tool_invocations,
            "Forced structured completion succeeded"
        );
        Ok(state.finish(output))
    }

    /// Zero-iteration path: one structured request, validated by the schema
    async fn complete_without_tools<S: OutputSchema>(
        &self,
        mut state: LoopState,
        schema: &S,
        definition: &ToolDefinition,
    ) -> Result<RunOutcome<S::Output>, AgentError> {
        state.record_model_call();
        let payload = self
            .client
            .complete_structured(state.messages(), definition)
            .await
            .map_err(model_error)?;

        state.add_message(ChatMessage::assistant(payload.to_string()));
        let output = schema.parse(payload)?;

        info!("Structured reply validated");
        Ok(state.finish(output))
    }

    async fn request_turn(
        &self,
        state: &mut LoopState,
        tools: &[ToolDefinition],
        choice: &ToolChoice,
    ) -> Result<ChatMessage, AgentError> {
        state.record_model_call();
        self.client
            .complete_with_tools(state.messages(), tools, choice)
            .await
            .map_err(model_error)
    }
}

fn model_error(e: anyhow::Error) -> AgentError {
    AgentError::Model(e.context("model request failed"))
}

/// Turn the schema call's arguments into the final answer
fn accept_answer<S: OutputSchema>(schema: &S, call: &ToolCall) -> Result<S::Output, AgentError> {
    let arguments = non_empty_arguments(&call.function.arguments).ok_or_else(|| {
        AgentError::MalformedStructuredCall {
            schema: schema.name().to_string(),
            reason: "the call arrived with empty arguments; the model probably ran out of output tokens"
                .to_string(),
        }
    })?;

    Ok(schema.parse(arguments)?)
}

/// `None` for null, `{}`, `[]` and blank strings; JSON-encoded strings are decoded
fn non_empty_arguments(arguments: &Value) -> Option<Value> {
    match arguments {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        Value::Array(items) if items.is_empty() => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::String(_)) | Err(_) => Some(arguments.clone()),
            Ok(decoded) => non_empty_arguments(&decoded),
        },
        other => Some(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::schema::fixtures::{Audience, BookOutput};
    use crate::schema::TypedSchema;
    use crate::tools::{ParameterProperty, ParameterSchema, ToolError};
    use anyhow::Result;
    use async_trait::async_trait;
    use llm_core::Role;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// One request seen by the scripted model
    #[derive(Debug, Clone)]
    enum Request {
        Structured,
        Tools {
            messages: Vec<ChatMessage>,
            tool_names: Vec<String>,
            choice: ToolChoice,
        },
    }

    /// Model that replays canned replies and records every request
    #[derive(Default)]
    struct ScriptedModel {
        structured: Mutex<VecDeque<Value>>,
        turns: Mutex<VecDeque<ChatMessage>>,
        requests: Mutex<Vec<Request>>,
    }

    impl ScriptedModel {
        fn with_structured(payload: Value) -> Arc<Self> {
            let model = Self::default();
            model.structured.lock().unwrap().push_back(payload);
            Arc::new(model)
        }

        fn with_turns(turns: Vec<ChatMessage>) -> Arc<Self> {
            let model = Self::default();
            model.turns.lock().unwrap().extend(turns);
            Arc::new(model)
        }

        fn requests(&self) -> Vec<Request> {
            self.requests.lock().unwrap().clone()
        }

        fn tool_requests(&self) -> Vec<(Vec<ChatMessage>, Vec<String>, ToolChoice)> {
            self.requests()
                .into_iter()
                .filter_map(|r| match r {
                    Request::Tools {
                        messages,
                        tool_names,
                        choice,
                    } => Some((messages, tool_names, choice)),
                    Request::Structured => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedModel {
        async fn complete_structured(
            &self,
            _messages: &[ChatMessage],
            _schema: &ToolDefinition,
        ) -> Result<Value> {
            self.requests.lock().unwrap().push(Request::Structured);
            self.structured
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("no structured reply scripted"))
        }

        async fn complete_with_tools(
            &self,
            messages: &[ChatMessage],
            tools: &[ToolDefinition],
            choice: &ToolChoice,
        ) -> Result<ChatMessage> {
            self.requests.lock().unwrap().push(Request::Tools {
                messages: messages.to_vec(),
                tool_names: tools.iter().map(|t| t.name().to_string()).collect(),
                choice: choice.clone(),
            });
            self.turns
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("no turn scripted"))
        }
    }

    /// Review lookup that records the titles it was asked about
    #[derive(Clone, Default)]
    struct CollectBookReviews {
        titles: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for CollectBookReviews {
        fn name(&self) -> &str {
            "collect_book_reviews"
        }

        fn description(&self) -> &str {
            "Retrieves book reviews from various trustworthy sources."
        }

        fn parameters_schema(&self) -> ParameterSchema {
            ParameterSchema::new().with_required(
                "book_title",
                ParameterProperty::string("The title of the book to lookup reviews for"),
            )
        }

        async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
            let title = args["book_title"].as_str().unwrap_or_default().to_string();
            self.titles.lock().unwrap().push(title);
            Ok(json!([
                "A difficult but manageable read going into college.",
                "A fantastic book for young adults."
            ]))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "fetch_isbn"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        fn parameters_schema(&self) -> ParameterSchema {
            ParameterSchema::new()
        }

        async fn execute(&self, _args: &Value) -> Result<Value, ToolError> {
            Err(anyhow::anyhow!("catalogue service timed out").into())
        }
    }

    fn book_conversation() -> Conversation {
        Conversation::new()
            .with_system("You are classifying books based on their first page of text.")
            .with_user("Tomorrow, and Tomorrow, and Tomorrow: Chapter 1 ...")
    }

    fn call_turn(calls: Vec<ToolCall>) -> ChatMessage {
        ChatMessage::assistant_with_tools("", calls)
    }

    fn reviews_call(id: &str, title: &str) -> ToolCall {
        ToolCall::new(id, "collect_book_reviews", json!({"book_title": title}))
    }

    fn answer_call(id: &str) -> ToolCall {
        ToolCall::new(
            id,
            "BookOutput",
            json!({"target_audience": "young adult", "reading_level": 3}),
        )
    }

    #[tokio::test]
    async fn test_no_tools_makes_single_structured_call() {
        let model = ScriptedModel::with_structured(json!({"target_audience": "adult", "reading_level": 4}));
        let agent = StructuredAgent::new(Arc::clone(&model)).with_max_executions(5);

        let outcome = agent
            .run_with_outcome(book_conversation(), &TypedSchema::<BookOutput>::new())
            .await
            .unwrap();

        assert_eq!(outcome.output.target_audience, Audience::Adult);
        assert_eq!(outcome.output.reading_level, 4);
        assert_eq!(outcome.model_calls, 1);
        assert_eq!(model.requests().len(), 1);
        assert!(matches!(model.requests()[0], Request::Structured));
    }

    #[tokio::test]
    async fn test_no_tools_validation_error_propagates() {
        let model = ScriptedModel::with_structured(json!({"target_audience": "adult", "reading_level": 9}));
        let agent = StructuredAgent::new(Arc::clone(&model));

        let err = agent
            .run(book_conversation(), &TypedSchema::<BookOutput>::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AgentError::Validation(ValidationError::OutOfRange { ref field, .. }) if field == "reading_level"
        ));
        assert_eq!(model.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_budget_rejected_before_any_model_call() {
        let model = ScriptedModel::with_structured(json!({}));
        let agent = StructuredAgent::new(Arc::clone(&model))
            .with_tool(CollectBookReviews::default())
            .with_max_executions(0);

        let err = agent
            .run(book_conversation(), &TypedSchema::<BookOutput>::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::InvalidArgument(_)));
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_tool_then_answer_skips_forced_completion() {
        let model = ScriptedModel::with_turns(vec![
            call_turn(vec![reviews_call("call_1", "Tomorrow, and Tomorrow, and Tomorrow")]),
            call_turn(vec![answer_call("call_2")]),
        ]);
        let reviews = CollectBookReviews::default();
        let agent = StructuredAgent::new(Arc::clone(&model)).with_tool(reviews.clone());

        let outcome = agent
            .run_with_outcome(book_conversation(), &TypedSchema::<BookOutput>::new())
            .await
            .unwrap();

        assert_eq!(outcome.output.target_audience, Audience::YoungAdult);
        assert_eq!(outcome.model_calls, 2);
        assert_eq!(outcome.tool_invocations, 1);
        assert!(!outcome.forced_completion);
        assert_eq!(reviews.titles.lock().unwrap().len(), 1);

        let requests = model.tool_requests();
        assert_eq!(requests.len(), 2);
        for (_, tool_names, choice) in &requests {
            assert_eq!(tool_names, &vec!["collect_book_reviews".to_string(), "BookOutput".to_string()]);
            assert_eq!(choice, &ToolChoice::Any);
        }

        // Second turn sees the assistant request and its correlated result
        let (messages, _, _) = &requests[1];
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[3].role, Role::Tool);
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_1"));
        assert!(messages[3].content.contains("young adults"));

        // Transcript ends with the answering turn
        assert_eq!(outcome.conversation.len(), 5);
        assert_eq!(outcome.conversation.last().unwrap().tool_calls[0].name(), "BookOutput");
    }

    #[tokio::test]
    async fn test_forced_completion_after_budget() {
        let model = ScriptedModel::with_turns(vec![
            call_turn(vec![reviews_call("a", "first")]),
            call_turn(vec![reviews_call("b", "second")]),
            call_turn(vec![answer_call("c")]),
        ]);
        let agent = StructuredAgent::new(Arc::clone(&model))
            .with_tool(CollectBookReviews::default())
            .with_max_executions(3);

        let outcome = agent
            .run_with_outcome(book_conversation(), &TypedSchema::<BookOutput>::new())
            .await
            .unwrap();

        assert!(outcome.forced_completion);
        assert_eq!(outcome.model_calls, 3);
        assert_eq!(outcome.tool_invocations, 2);

        let requests = model.tool_requests();
        assert_eq!(requests.len(), 3);
        let (messages, tool_names, choice) = &requests[2];
        assert_eq!(tool_names, &vec!["BookOutput".to_string()]);
        assert_eq!(choice, &ToolChoice::Function("BookOutput".to_string()));
        assert_eq!(messages.last().unwrap().tool_call_id.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_model_calls_never_exceed_budget() {
        for budget in 1..=5 {
            let mut turns: Vec<ChatMessage> = (1..budget)
                .map(|i| call_turn(vec![reviews_call(&format!("call_{}", i), "title")]))
                .collect();
            turns.push(call_turn(vec![answer_call("final")]));
            // Extra turns that must never be requested
            turns.push(call_turn(vec![answer_call("unused")]));

            let model = ScriptedModel::with_turns(turns);
            let agent = StructuredAgent::new(Arc::clone(&model))
                .with_tool(CollectBookReviews::default())
                .with_max_executions(budget);

            let outcome = agent
                .run_with_outcome(book_conversation(), &TypedSchema::<BookOutput>::new())
                .await
                .unwrap();

            assert_eq!(outcome.model_calls, budget);
            assert_eq!(model.requests().len(), budget);
            assert!(outcome.forced_completion);
        }
    }

    #[tokio::test]
    async fn test_budget_of_one_goes_straight_to_forced_turn() {
        let model = ScriptedModel::with_turns(vec![call_turn(vec![answer_call("only")])]);
        let agent = StructuredAgent::new(Arc::clone(&model))
            .with_tool(CollectBookReviews::default())
            .with_max_executions(1);

        let outcome = agent
            .run_with_outcome(book_conversation(), &TypedSchema::<BookOutput>::new())
            .await
            .unwrap();

        assert!(outcome.forced_completion);
        assert_eq!(outcome.model_calls, 1);
        let (_, _, choice) = &model.tool_requests()[0];
        assert_eq!(choice, &ToolChoice::Function("BookOutput".to_string()));
    }

    #[tokio::test]
    async fn test_answer_on_early_turn_returns_immediately() {
        let model = ScriptedModel::with_turns(vec![
            call_turn(vec![answer_call("first")]),
            call_turn(vec![reviews_call("never", "never")]),
        ]);
        let agent = StructuredAgent::new(Arc::clone(&model))
            .with_tool(CollectBookReviews::default())
            .with_max_executions(10);

        let outcome = agent
            .run_with_outcome(book_conversation(), &TypedSchema::<BookOutput>::new())
            .await
            .unwrap();

        assert_eq!(outcome.model_calls, 1);
        assert_eq!(model.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_tool_result_is_fed_back() {
        let model = ScriptedModel::with_turns(vec![
            call_turn(vec![ToolCall::new("isbn_1", "fetch_isbn", json!({}))]),
            call_turn(vec![answer_call("done")]),
        ]);
        let agent = StructuredAgent::new(Arc::clone(&model))
            .with_tool(FailingTool)
            .with_max_executions(4);

        let outcome = agent
            .run_with_outcome(book_conversation(), &TypedSchema::<BookOutput>::new())
            .await
            .unwrap();

        assert_eq!(outcome.output.reading_level, 3);
        assert_eq!(outcome.tool_invocations, 1);

        let (messages, _, _) = &model.tool_requests()[1];
        let result = messages.last().unwrap();
        assert_eq!(result.role, Role::Tool);
        assert_eq!(result.tool_call_id.as_deref(), Some("isbn_1"));
        assert_eq!(result.content, "Error: catalogue service timed out");
    }

    #[tokio::test]
    async fn test_always_failing_tool_still_terminates() {
        let turns = (0..3)
            .map(|i| call_turn(vec![ToolCall::new(format!("f{}", i), "fetch_isbn", json!({}))]))
            .chain(std::iter::once(call_turn(vec![answer_call("forced")])))
            .collect();
        let model = ScriptedModel::with_turns(turns);
        let agent = StructuredAgent::new(Arc::clone(&model))
            .with_tool(FailingTool)
            .with_max_executions(4);

        let outcome = agent
            .run_with_outcome(book_conversation(), &TypedSchema::<BookOutput>::new())
            .await
            .unwrap();

        assert!(outcome.forced_completion);
        assert_eq!(outcome.model_calls, 4);
        assert_eq!(outcome.conversation.count_role(Role::Tool), 3);
    }

    #[tokio::test]
    async fn test_empty_schema_arguments_fail_fast() {
        for empty in [json!({}), json!([]), json!(null), json!("[]")] {
            let model = ScriptedModel::with_turns(vec![
                call_turn(vec![ToolCall::new("x", "BookOutput", empty.clone())]),
                call_turn(vec![answer_call("never")]),
            ]);
            let agent = StructuredAgent::new(Arc::clone(&model)).with_tool(CollectBookReviews::default());

            let err = agent
                .run(book_conversation(), &TypedSchema::<BookOutput>::new())
                .await
                .unwrap_err();

            assert!(
                matches!(err, AgentError::MalformedStructuredCall { ref schema, .. } if schema == "BookOutput"),
                "arguments {} gave {:?}",
                empty,
                err
            );
            assert_eq!(model.requests().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_schema_call_short_circuits_other_requests() {
        let model = ScriptedModel::with_turns(vec![call_turn(vec![
            reviews_call("r1", "ignored"),
            answer_call("a1"),
            reviews_call("r2", "ignored too"),
        ])]);
        let reviews = CollectBookReviews::default();
        let agent = StructuredAgent::new(Arc::clone(&model)).with_tool(reviews.clone());

        let outcome = agent
            .run_with_outcome(book_conversation(), &TypedSchema::<BookOutput>::new())
            .await
            .unwrap();

        assert_eq!(outcome.tool_invocations, 0);
        assert!(reviews.titles.lock().unwrap().is_empty());
        assert_eq!(outcome.model_calls, 1);
    }

    #[tokio::test]
    async fn test_calls_dispatched_in_emitted_order() {
        let model = ScriptedModel::with_turns(vec![
            call_turn(vec![
                reviews_call("1", "Dune"),
                ToolCall::new("2", "translate", json!({"text": "hola"})),
                reviews_call("3", "Emma"),
            ]),
            call_turn(vec![answer_call("4")]),
        ]);
        let reviews = CollectBookReviews::default();
        let agent = StructuredAgent::new(Arc::clone(&model)).with_tool(reviews.clone());

        let outcome = agent
            .run_with_outcome(book_conversation(), &TypedSchema::<BookOutput>::new())
            .await
            .unwrap();

        assert_eq!(*reviews.titles.lock().unwrap(), vec!["Dune", "Emma"]);
        assert_eq!(outcome.tool_invocations, 2);

        // Every request got exactly one result, unknown tools included
        let (messages, _, _) = &model.tool_requests()[1];
        let results: Vec<_> = messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| (m.tool_call_id.clone().unwrap(), m.content.clone()))
            .collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, "1");
        assert_eq!(results[1].0, "2");
        assert!(results[1].1.starts_with("Error: unknown tool 'translate'"));
        assert_eq!(results[2].0, "3");
    }

    #[tokio::test]
    async fn test_turn_without_tool_calls_continues() {
        let model = ScriptedModel::with_turns(vec![
            ChatMessage::assistant("Let me think about this book."),
            call_turn(vec![answer_call("a")]),
        ]);
        let agent = StructuredAgent::new(Arc::clone(&model)).with_tool(CollectBookReviews::default());

        let outcome = agent
            .run_with_outcome(book_conversation(), &TypedSchema::<BookOutput>::new())
            .await
            .unwrap();

        assert_eq!(outcome.model_calls, 2);
        let (messages, _, _) = &model.tool_requests()[1];
        assert_eq!(messages.last().unwrap().content, "Let me think about this book.");
    }

    #[tokio::test]
    async fn test_forced_turn_without_schema_call_is_malformed() {
        let model = ScriptedModel::with_turns(vec![
            call_turn(vec![reviews_call("a", "x")]),
            ChatMessage::assistant("I refuse to answer."),
        ]);
        let agent = StructuredAgent::new(Arc::clone(&model))
            .with_tool(CollectBookReviews::default())
            .with_max_executions(2);

        let err = agent
            .run(book_conversation(), &TypedSchema::<BookOutput>::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::MalformedStructuredCall { .. }));
    }

    #[tokio::test]
    async fn test_forced_turn_validation_error_propagates() {
        let model = ScriptedModel::with_turns(vec![call_turn(vec![ToolCall::new(
            "a",
            "BookOutput",
            json!({"target_audience": "adult", "reading_level": 0}),
        )])]);
        let agent = StructuredAgent::new(Arc::clone(&model))
            .with_tool(CollectBookReviews::default())
            .with_max_executions(1);

        let err = agent
            .run(book_conversation(), &TypedSchema::<BookOutput>::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Validation(ValidationError::OutOfRange { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_tool_names_rejected_before_model_call() {
        let model = ScriptedModel::with_turns(vec![call_turn(vec![answer_call("a")])]);
        let agent = StructuredAgent::new(Arc::clone(&model))
            .with_tool(CollectBookReviews::default())
            .with_tool(CollectBookReviews::default());

        let err = agent
            .run(book_conversation(), &TypedSchema::<BookOutput>::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::InvalidArgument(_)));
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let model = ScriptedModel::with_turns(vec![]);
        let agent = StructuredAgent::new(Arc::clone(&model)).with_tool(CollectBookReviews::default());

        let err = agent
            .run(book_conversation(), &TypedSchema::<BookOutput>::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Model(_)));
        assert_eq!(model.requests().len(), 1);
    }

    #[test]
    fn test_non_empty_arguments() {
        assert!(non_empty_arguments(&json!(null)).is_none());
        assert!(non_empty_arguments(&json!({})).is_none());
        assert!(non_empty_arguments(&json!("  ")).is_none());
        assert!(non_empty_arguments(&json!("{}")).is_none());
        assert!(non_empty_arguments(&json!([])).is_none());
        assert!(non_empty_arguments(&json!("[]")).is_none());

        let decoded = non_empty_arguments(&json!(r#"{"reading_level": 2}"#)).unwrap();
        assert_eq!(decoded, json!({"reading_level": 2}));

        assert_eq!(non_empty_arguments(&json!({"a": 1})).unwrap(), json!({"a": 1}));
    }
}
