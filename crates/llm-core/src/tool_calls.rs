//! Recovery of tool calls written into message text
//!
//! Many local models answer a tool-calling request with the call serialized
//! as JSON in `content` instead of Ollama's native `tool_calls` field. These
//! helpers turn that text back into [`ToolCall`]s.

use serde::Deserialize;
use serde_json::Value;

use crate::ollama::ToolCall;

#[derive(Deserialize)]
struct ToolCallJson {
    name: String,
    #[serde(default, alias = "parameters")]
    arguments: Value,
}

impl ToolCallJson {
    fn into_call(self) -> Option<ToolCall> {
        if self.name.is_empty() {
            return None;
        }
        Some(ToolCall::generated(self.name, self.arguments))
    }
}

/// Parse JSON tool calls from content text
///
/// Supports:
/// - Raw JSON: `{"name": "tool_name", "arguments": {...}}`
/// - Markdown code blocks: ```json\n{"name": ...}\n```
/// - Arrays of calls
/// - Call objects embedded in surrounding prose
pub fn parse_json_tool_calls(content: &str) -> Option<Vec<ToolCall>> {
    let content = content.trim();
    if content.is_empty() {
        return None;
    }

    let json_content = extract_json_from_markdown(content).unwrap_or(content);

    if let Some(call) = try_parse_single_tool_call(json_content) {
        return Some(vec![call]);
    }

    if let Some(calls) = try_parse_tool_call_array(json_content) {
        return Some(calls);
    }

    let calls: Vec<ToolCall> = json_objects(content)
        .into_iter()
        .filter_map(try_parse_single_tool_call)
        .collect();

    if calls.is_empty() {
        None
    } else {
        Some(calls)
    }
}

/// Parse the first JSON object found in content text
///
/// Used when the model was asked for a single function's arguments and
/// answered with the bare arguments object.
pub fn parse_json_object(content: &str) -> Option<Value> {
    let content = content.trim();
    let json_content = extract_json_from_markdown(content).unwrap_or(content);

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(json_content) {
        return Some(value);
    }

    json_objects(content)
        .into_iter()
        .find_map(|candidate| match serde_json::from_str::<Value>(candidate) {
            Ok(value @ Value::Object(_)) => Some(value),
            _ => None,
        })
}

/// Extract JSON content from markdown code blocks
fn extract_json_from_markdown(content: &str) -> Option<&str> {
    let patterns = ["```json\n", "```JSON\n", "```\n"];

    for pattern in patterns {
        if let Some(start) = content.find(pattern) {
            let json_start = start + pattern.len();
            if let Some(end) = content[json_start..].find("```") {
                return Some(content[json_start..json_start + end].trim());
            }
        }
    }

    None
}

fn try_parse_single_tool_call(content: &str) -> Option<ToolCall> {
    serde_json::from_str::<ToolCallJson>(content).ok()?.into_call()
}

fn try_parse_tool_call_array(content: &str) -> Option<Vec<ToolCall>> {
    let parsed: Vec<ToolCallJson> = serde_json::from_str(content).ok()?;

    let calls: Vec<ToolCall> = parsed.into_iter().filter_map(ToolCallJson::into_call).collect();

    if calls.is_empty() {
        None
    } else {
        Some(calls)
    }
}

/// Top-level `{...}` spans in content, skipping braces inside string literals
fn json_objects(content: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in content.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        spans.push(&content[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }

    spans
}
