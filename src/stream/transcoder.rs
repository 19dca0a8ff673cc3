//! Reverse Codex transcoder (spec §4.G(d)): Responses-API SSE events back
//! into Chat-Completions chunks. The forward (request) direction lives in
//! `amprelay-schema::codex`.

use std::collections::HashMap;

use serde_json::{Value, json};

#[derive(Debug, Default)]
pub struct ResponsesToChatState {
    response_id: Option<String>,
    model: String,
    created: i64,
    next_tool_call_index: u32,
    tool_call_ids: HashMap<String, u32>,
    any_tool_calls: bool,
}

impl ResponsesToChatState {
    pub fn new(model: &str, created: i64) -> Self {
        Self {
            model: model.to_string(),
            created,
            ..Self::default()
        }
    }

    fn chunk(&self, delta: Value, finish_reason: Option<&str>, usage: Option<Value>) -> Value {
        let choice = json!({
            "index": 0,
            "delta": delta,
            "finish_reason": finish_reason,
        });
        let mut body = json!({
            "id": format!("chatcmpl-{}", self.response_id.as_deref().unwrap_or("unknown")),
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "choices": [choice],
        });
        if let Some(usage) = usage {
            body["usage"] = usage;
        }
        body
    }

    /// Feed one decoded Responses-API SSE event (`event:` name + parsed JSON
    /// `data:` payload); returns zero or more Chat-Completions chunks to
    /// emit as `data:` lines.
    pub fn handle_event(&mut self, event: &str, data: &Value) -> Vec<Value> {
        match event {
            "response.created" => {
                if let Some(id) = data.pointer("/response/id").and_then(Value::as_str) {
                    self.response_id = Some(id.to_string());
                }
                vec![]
            }
            "response.output_item.added" => self.handle_output_item_added(data),
            "response.output_text.delta" => {
                let delta = data.get("delta").and_then(Value::as_str).unwrap_or_default();
                vec![self.chunk(json!({"content": delta}), None, None)]
            }
            "response.reasoning_summary_text.delta" => {
                let delta = data.get("delta").and_then(Value::as_str).unwrap_or_default();
                vec![self.chunk(json!({"content": delta}), None, None)]
            }
            "response.function_call_arguments.delta" => self.handle_function_call_arguments_delta(data),
            "response.completed" => vec![self.handle_completed(data)],
            _ => vec![],
        }
    }

    fn handle_output_item_added(&mut self, data: &Value) -> Vec<Value> {
        let Some(item) = data.get("item") else { return vec![] };
        match item.get("type").and_then(Value::as_str) {
            Some("message") if item.get("role").and_then(Value::as_str) == Some("assistant") => {
                vec![self.chunk(json!({"role": "assistant", "content": ""}), None, None)]
            }
            Some("function_call") => {
                let call_id = item.get("call_id").and_then(Value::as_str).unwrap_or_default();
                let name = item.get("name").and_then(Value::as_str).unwrap_or_default();
                let index = self.next_tool_call_index;
                self.next_tool_call_index += 1;
                self.tool_call_ids.insert(call_id.to_string(), index);
                self.any_tool_calls = true;
                vec![self.chunk(
                    json!({
                        "tool_calls": [{
                            "index": index,
                            "id": call_id,
                            "type": "function",
                            "function": {"name": name, "arguments": ""},
                        }]
                    }),
                    None,
                    None,
                )]
            }
            _ => vec![],
        }
    }

    fn handle_function_call_arguments_delta(&self, data: &Value) -> Vec<Value> {
        let Some(call_id) = data.get("call_id").and_then(Value::as_str) else {
            return vec![];
        };
        let Some(&index) = self.tool_call_ids.get(call_id) else {
            return vec![];
        };
        let delta = data.get("delta").and_then(Value::as_str).unwrap_or_default();
        vec![self.chunk(
            json!({"tool_calls": [{"index": index, "function": {"arguments": delta}}]}),
            None,
            None,
        )]
    }

    fn handle_completed(&self, data: &Value) -> Value {
        let finish_reason = if self.any_tool_calls { "tool_calls" } else { "stop" };
        let usage = data.pointer("/response/usage").map(|u| {
            let prompt = u.get("input_tokens").and_then(Value::as_i64).unwrap_or(0);
            let completion = u.get("output_tokens").and_then(Value::as_i64).unwrap_or(0);
            let cached = u.pointer("/input_tokens_details/cached_tokens").and_then(Value::as_i64);
            let mut usage = json!({
                "prompt_tokens": prompt,
                "completion_tokens": completion,
                "total_tokens": prompt + completion,
            });
            if let Some(cached) = cached {
                usage["prompt_tokens_details"] = json!({"cached_tokens": cached});
            }
            usage
        });
        self.chunk(json!({}), Some(finish_reason), usage)
    }
}

/// Render a Chat-Completions chunk as an SSE `data:` line (no `event:`
/// name). Call once more with `None` at stream end to append the
/// terminating `data: [DONE]`.
pub fn render_sse_line(chunk: Option<&Value>) -> String {
    match chunk {
        Some(value) => format!("data: {value}\n\n"),
        None => "data: [DONE]\n\n".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_and_text_delta_produce_role_then_content_chunks() {
        let mut state = ResponsesToChatState::new("gpt-5.1", 1000);
        let added = state.handle_event(
            "response.output_item.added",
            &json!({"item": {"type": "message", "role": "assistant"}}),
        );
        assert_eq!(added[0]["choices"][0]["delta"]["role"], "assistant");

        let delta = state.handle_event("response.output_text.delta", &json!({"delta": "hi"}));
        assert_eq!(delta[0]["choices"][0]["delta"]["content"], "hi");
    }

    #[test]
    fn function_call_lifecycle_tracks_index_by_call_id() {
        let mut state = ResponsesToChatState::new("gpt-5.1", 1000);
        // `id` (the output item's own id) and `call_id` are distinct
        // namespaces on real Codex traffic; use different literals so a
        // regression back to keying/lookup by `id` would fail this test.
        state.handle_event(
            "response.output_item.added",
            &json!({"item": {"type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "grep"}}),
        );
        let args = state.handle_event(
            "response.function_call_arguments.delta",
            &json!({"item_id": "fc_1", "call_id": "call_1", "delta": "{\"q\":"}),
        );
        assert_eq!(args[0]["choices"][0]["delta"]["tool_calls"][0]["index"], 0);
        assert_eq!(
            args[0]["choices"][0]["delta"]["tool_calls"][0]["function"]["arguments"],
            "{\"q\":"
        );
    }

    #[test]
    fn completed_reports_tool_calls_finish_reason_when_any_were_emitted() {
        let mut state = ResponsesToChatState::new("gpt-5.1", 1000);
        state.handle_event(
            "response.output_item.added",
            &json!({"item": {"type": "function_call", "call_id": "c1", "name": "f"}}),
        );
        let completed = state.handle_event(
            "response.completed",
            &json!({"response": {"usage": {"input_tokens": 10, "output_tokens": 5, "input_tokens_details": {"cached_tokens": 2}}}}),
        );
        assert_eq!(completed[0]["choices"][0]["finish_reason"], "tool_calls");
        assert_eq!(completed[0]["usage"]["prompt_tokens_details"]["cached_tokens"], 2);
    }

    #[test]
    fn unknown_event_types_are_silently_absorbed() {
        let mut state = ResponsesToChatState::new("gpt-5.1", 1000);
        assert!(state.handle_event("response.in_progress", &json!({})).is_empty());
    }
}
