//! Chat-Completions request schema and its translation into a Codex Responses-API body.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Inbound Chat-Completions request as sent by the client.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionsRequest {
    pub model: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<ChatContent>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<Value>),
}

impl ChatContent {
    fn as_text(&self) -> String {
        match self {
            ChatContent::Text(s) => s.clone(),
            ChatContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(o) if o.get("type").and_then(Value::as_str) == Some("text") => {
                        o.get("text").and_then(Value::as_str).map(str::to_string)
                    }
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatToolCall {
    pub id: String,
    pub function: ChatFunctionCall,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatFunctionCall {
    pub name: String,
    pub arguments: String,
}

/// A single item of the Responses-API `input` array. The shape varies by `item_type`
/// (message / function_call / function_call_output), so everything beyond `role` and
/// `content` rides in `extra` and is flattened back out on serialization.
#[derive(Debug, Clone, Serialize)]
pub struct ResponsesInputItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<Value>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn input_text(text: impl Into<String>) -> Value {
    json!({"type": "input_text", "text": text.into()})
}

impl ResponsesInputItem {
    fn user_message(text: &str) -> Self {
        Self {
            role: Some("user".to_string()),
            content: Some(vec![input_text(text)]),
            extra: BTreeMap::new(),
        }
    }

    fn developer_message(text: &str) -> Self {
        Self {
            role: Some("developer".to_string()),
            content: Some(vec![input_text(text)]),
            extra: BTreeMap::new(),
        }
    }

    fn assistant_message(text: &str) -> Self {
        let mut extra = BTreeMap::new();
        extra.insert("type".to_string(), json!("message"));
        extra.insert("status".to_string(), json!("completed"));
        Self {
            role: Some("assistant".to_string()),
            content: Some(vec![
                json!({"type": "output_text", "text": text, "annotations": []}),
            ]),
            extra,
        }
    }

    fn function_call(call_id: &str, name: &str, arguments: &str) -> Self {
        let mut extra = BTreeMap::new();
        extra.insert("type".to_string(), json!("function_call"));
        extra.insert("call_id".to_string(), json!(call_id));
        extra.insert("name".to_string(), json!(name));
        extra.insert("arguments".to_string(), json!(arguments));
        Self {
            role: None,
            content: None,
            extra,
        }
    }

    fn function_call_output(call_id: &str, output: &str) -> Self {
        let mut extra = BTreeMap::new();
        extra.insert("type".to_string(), json!("function_call_output"));
        extra.insert("call_id".to_string(), json!(call_id));
        extra.insert("output".to_string(), json!(output));
        Self {
            role: None,
            content: None,
            extra,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Reasoning {
    pub effort: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextVerbosity {
    pub verbosity: String,
}

/// Outbound Codex Responses-API request body.
#[derive(Debug, Clone, Serialize)]
pub struct ResponsesRequestBody {
    pub model: String,
    pub instructions: String,
    pub input: Vec<ResponsesInputItem>,
    pub store: bool,
    pub stream: bool,
    pub reasoning: Reasoning,
    pub text: TextVerbosity,
    pub include: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_cache_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    #[serde(skip_serializing_if = "bool_is_false")]
    pub parallel_tool_calls: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn bool_is_false(b: &bool) -> bool {
    !*b
}

const STRIPPED_FIELDS: &[&str] = &[
    "max_tokens",
    "max_completion_tokens",
    "frequency_penalty",
    "logprobs",
    "top_logprobs",
    "n",
    "presence_penalty",
    "seed",
    "stop",
    "logit_bias",
    "response_format",
];

/// Reasoning-effort clamp rules, keyed by model id prefix.
pub fn clamp_reasoning_effort(model: &str, effort: &str) -> String {
    if model == "gpt-5.1" {
        return if effort == "xhigh" {
            "high".to_string()
        } else {
            effort.to_string()
        };
    }
    if model.starts_with("gpt-5.2") || model.starts_with("gpt-5.3") {
        return if effort == "minimal" {
            "low".to_string()
        } else {
            effort.to_string()
        };
    }
    if model == "gpt-5.1-codex-mini" {
        return match effort {
            "high" | "xhigh" => "high".to_string(),
            _ => "medium".to_string(),
        };
    }
    effort.to_string()
}

/// Remove `STRIPPED_FIELDS` (and any stray `id` field) from a client-supplied
/// JSON tree before it's passed through verbatim, recursing into nested
/// objects/arrays (e.g. a `tools` array of per-tool objects).
fn strip_banned_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for field in STRIPPED_FIELDS {
                map.remove(*field);
            }
            for v in map.values_mut() {
                strip_banned_fields(v);
            }
        }
        Value::Array(items) => {
            for v in items {
                strip_banned_fields(v);
            }
        }
        _ => {}
    }
}

fn normalize_tool_choice(v: &Value) -> Value {
    if let Some(obj) = v.as_object() {
        if obj.get("type").and_then(Value::as_str) == Some("function") {
            let name = obj
                .get("function")
                .and_then(|f| f.get("name"))
                .and_then(Value::as_str)
                .or_else(|| obj.get("name").and_then(Value::as_str));
            if let Some(name) = name {
                return json!({"type": "function", "name": name});
            }
        }
    }
    v.clone()
}

/// Translate an inbound Chat-Completions request into a Codex Responses-API body.
///
/// `prompt_cache_key` is the thread id echoed by the client (`x-amp-thread-id`), if any.
pub fn build_responses_request(
    chat: ChatCompletionsRequest,
    prompt_cache_key: Option<String>,
) -> ResponsesRequestBody {
    let mut instructions: Option<String> = None;
    let mut input = Vec::with_capacity(chat.messages.len());
    let mut call_ids_seen: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut function_call_names: BTreeMap<String, String> = BTreeMap::new();

    for m in &chat.messages {
        if m.role == "user" || m.role == "system" || m.role == "developer" {
            if let Some(tc) = &m.tool_calls {
                for call in tc {
                    function_call_names.insert(call.id.clone(), call.function.name.clone());
                }
            }
        }
        if m.role == "assistant" {
            if let Some(tc) = &m.tool_calls {
                for call in tc {
                    function_call_names.insert(call.id.clone(), call.function.name.clone());
                }
            }
        }
    }

    for (idx, m) in chat.messages.iter().enumerate() {
        let text = m.content.as_ref().map(ChatContent::as_text).unwrap_or_default();
        match m.role.as_str() {
            "system" | "developer" => {
                if instructions.is_none() && idx == first_system_index(&chat.messages) {
                    instructions = Some(text);
                } else {
                    input.push(ResponsesInputItem::developer_message(&text));
                }
            }
            "user" => {
                if let Some(ChatContent::Parts(parts)) = &m.content {
                    let mut content = Vec::new();
                    for part in parts {
                        match part.get("type").and_then(Value::as_str) {
                            Some("image_url") => {
                                let image_url = part.get("image_url").cloned().unwrap_or(Value::Null);
                                let (url, detail) = match &image_url {
                                    Value::Object(o) => (
                                        o.get("url").cloned().unwrap_or(Value::Null),
                                        o.get("detail")
                                            .and_then(Value::as_str)
                                            .unwrap_or("auto")
                                            .to_string(),
                                    ),
                                    other => (other.clone(), "auto".to_string()),
                                };
                                content.push(
                                    json!({"type": "input_image", "image_url": url, "detail": detail}),
                                );
                            }
                            Some("text") | None => {
                                if let Some(t) = part.get("text").and_then(Value::as_str) {
                                    content.push(input_text(t));
                                } else if let Value::String(s) = part {
                                    content.push(input_text(s.as_str()));
                                }
                            }
                            _ => {}
                        }
                    }
                    input.push(ResponsesInputItem {
                        role: Some("user".to_string()),
                        content: Some(content),
                        extra: BTreeMap::new(),
                    });
                } else {
                    input.push(ResponsesInputItem::user_message(&text));
                }
            }
            "assistant" => {
                if !text.trim().is_empty() {
                    input.push(ResponsesInputItem::assistant_message(&text));
                }
                if let Some(calls) = &m.tool_calls {
                    for call in calls {
                        call_ids_seen.insert(call.id.clone());
                        input.push(ResponsesInputItem::function_call(
                            &call.id,
                            &call.function.name,
                            &call.function.arguments,
                        ));
                    }
                }
            }
            "tool" => {
                let call_id = m.tool_call_id.clone().unwrap_or_default();
                if call_ids_seen.contains(&call_id) {
                    input.push(ResponsesInputItem::function_call_output(&call_id, &text));
                } else {
                    let tool_name = function_call_names
                        .get(&call_id)
                        .cloned()
                        .unwrap_or_else(|| "tool".to_string());
                    let truncated: String = text.chars().take(16_000).collect();
                    let synthetic = format!(
                        "[Previous {tool_name} result; call_id={call_id}]: {truncated}"
                    );
                    input.push(ResponsesInputItem::assistant_message(&synthetic));
                }
            }
            _ => {
                input.push(ResponsesInputItem::user_message(&text));
            }
        }
    }

    let effort = chat
        .extra
        .get("reasoning")
        .and_then(|r| r.get("effort"))
        .and_then(Value::as_str)
        .unwrap_or("high");
    let effort = clamp_reasoning_effort(&chat.model, effort);

    let mut include = vec!["reasoning.encrypted_content".to_string()];
    if let Some(extra_include) = chat.extra.get("include").and_then(Value::as_array) {
        for v in extra_include {
            if let Some(s) = v.as_str() {
                if !include.iter().any(|x| x == s) {
                    include.push(s.to_string());
                }
            }
        }
    }

    let tool_choice = chat.extra.get("tool_choice").map(normalize_tool_choice);
    let tools = chat.extra.get("tools").cloned().map(|mut tools| {
        strip_banned_fields(&mut tools);
        tools
    });

    // The Responses API input array has no use for a caller-assigned `id` on
    // each item; the server assigns its own.
    for item in &mut input {
        item.extra.remove("id");
    }

    let mut extra_instructions = chat
        .extra
        .get("instructions")
        .and_then(Value::as_str)
        .map(str::to_string);
    if let Some(found) = instructions.take() {
        extra_instructions = Some(match extra_instructions {
            Some(explicit) if !explicit.trim().is_empty() => {
                format!("{explicit}\n\n{found}")
            }
            _ => found,
        });
    }

    ResponsesRequestBody {
        model: chat.model.clone(),
        instructions: extra_instructions.unwrap_or_default(),
        input,
        store: false,
        stream: true,
        reasoning: Reasoning {
            effort,
            summary: "auto".to_string(),
        },
        text: TextVerbosity {
            verbosity: "medium".to_string(),
        },
        include,
        prompt_cache_key,
        tool_choice,
        tools,
        parallel_tool_calls: true,
    }
}

fn first_system_index(messages: &[ChatMessage]) -> usize {
    messages
        .iter()
        .position(|m| m.role == "system" || m.role == "developer")
        .unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(v: Value) -> ChatCompletionsRequest {
        serde_json::from_value(v).expect("deserialize chat request")
    }

    #[test]
    fn forces_store_false_and_stream_true() {
        let req = chat(json!({
            "model": "gpt-5.2",
            "messages": [{"role": "system", "content": "sys"}, {"role": "user", "content": "hi"}],
        }));
        let body = build_responses_request(req, None);
        assert!(!body.store);
        assert!(body.stream);
        assert_eq!(body.instructions, "sys");
        assert_eq!(body.input.len(), 1);
        assert_eq!(body.input[0].role.as_deref(), Some("user"));
    }

    #[test]
    fn translates_tool_calls_and_tool_results() {
        let req = chat(json!({
            "model": "gpt-5.2",
            "messages": [
                {"role": "user", "content": "weather?"},
                {"role": "assistant", "content": "", "tool_calls": [
                    {"id": "call_1", "type": "function", "function": {"name": "get_weather", "arguments": "{}"}}
                ]},
                {"role": "tool", "tool_call_id": "call_1", "content": "sunny"}
            ],
        }));
        let body = build_responses_request(req, None);
        let kinds: Vec<_> = body
            .input
            .iter()
            .map(|i| i.extra.get("type").and_then(Value::as_str).unwrap_or("message"))
            .collect();
        assert!(kinds.contains(&"function_call"));
        assert!(kinds.contains(&"function_call_output"));
    }

    #[test]
    fn orphan_tool_result_becomes_synthetic_assistant_message() {
        let req = chat(json!({
            "model": "gpt-5.2",
            "messages": [
                {"role": "tool", "tool_call_id": "call_missing", "content": "42"}
            ],
        }));
        let body = build_responses_request(req, None);
        assert_eq!(body.input.len(), 1);
        let content = body.input[0].content.as_ref().unwrap();
        let text = content[0].get("text").and_then(Value::as_str).unwrap();
        assert!(text.starts_with("[Previous tool result; call_id=call_missing]: 42"));
    }

    #[test]
    fn strips_fields_not_in_the_responses_api_from_passthrough_tools() {
        let req = chat(json!({
            "model": "gpt-5.2",
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [{"name": "search", "response_format": {"type": "json"}, "logit_bias": {"1": 2}}],
        }));
        let body = build_responses_request(req, None);
        let tool = &body.tools.unwrap()[0];
        assert!(tool.get("response_format").is_none());
        assert!(tool.get("logit_bias").is_none());
        assert_eq!(tool.get("name").and_then(Value::as_str), Some("search"));
    }

    #[test]
    fn reasoning_effort_clamp_rules() {
        assert_eq!(clamp_reasoning_effort("gpt-5.1", "xhigh"), "high");
        assert_eq!(clamp_reasoning_effort("gpt-5.2-preview", "minimal"), "low");
        assert_eq!(clamp_reasoning_effort("gpt-5.1-codex-mini", "high"), "high");
        assert_eq!(clamp_reasoning_effort("gpt-5.1-codex-mini", "low"), "medium");
        assert_eq!(clamp_reasoning_effort("gpt-4o", "medium"), "medium");
    }

    #[test]
    fn normalizes_tool_choice_shape() {
        let req = chat(json!({
            "model": "gpt-5.2",
            "messages": [{"role": "user", "content": "hi"}],
            "tool_choice": {"type": "function", "function": {"name": "search"}},
        }));
        let body = build_responses_request(req, Some("thread-1".to_string()));
        assert_eq!(body.tool_choice, Some(json!({"type": "function", "name": "search"})));
        assert_eq!(body.prompt_cache_key.as_deref(), Some("thread-1"));
    }
}
