//! Model-name substitution and thinking suppression on the Anthropic SSE path
//! (spec §4.G(b)).

use serde_json::Value;

const MODEL_PATHS: [&[&str]; 5] = [
    &["model"],
    &["message", "model"],
    &["modelVersion"],
    &["response", "model"],
    &["response", "modelVersion"],
];

/// Rewrite a single SSE `data:` payload. `[DONE]` and malformed JSON are
/// forwarded unchanged.
pub fn rewrite_payload(raw: &str, client_model: &str) -> String {
    if raw == "[DONE]" {
        return raw.to_string();
    }

    let Ok(mut value) = serde_json::from_str::<Value>(raw) else {
        return raw.to_string();
    };

    for path in MODEL_PATHS {
        substitute_at_path(&mut value, path, client_model);
    }
    suppress_thinking_alongside_tool_use(&mut value);

    serde_json::to_string(&value).unwrap_or_else(|_| raw.to_string())
}

fn substitute_at_path(value: &mut Value, path: &[&str], client_model: &str) {
    let Some((last, prefix)) = path.split_last() else {
        return;
    };
    let mut cursor = value;
    for segment in prefix {
        let Some(next) = cursor.get_mut(*segment) else {
            return;
        };
        cursor = next;
    }
    if let Some(obj) = cursor.as_object_mut() {
        if let Some(Value::String(s)) = obj.get_mut(*last) {
            if s != client_model {
                *s = client_model.to_string();
            }
        }
    }
}

/// If `content` is an array containing both a `tool_use` and a `thinking`
/// element, drop every `thinking` element (the client can't render both in
/// one message).
fn suppress_thinking_alongside_tool_use(value: &mut Value) {
    let Some(content) = value.get_mut("content").and_then(Value::as_array_mut) else {
        return;
    };

    let has_tool_use = content.iter().any(|el| is_block_type(el, "tool_use"));
    let has_thinking = content.iter().any(|el| is_block_type(el, "thinking"));
    if has_tool_use && has_thinking {
        content.retain(|el| !is_block_type(el, "thinking"));
    }
}

fn is_block_type(el: &Value, kind: &str) -> bool {
    el.get("type").and_then(Value::as_str) == Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_all_known_model_paths() {
        let raw = json!({
            "model": "claude-upstream",
            "message": {"model": "claude-upstream"},
            "modelVersion": "claude-upstream",
            "response": {"model": "claude-upstream", "modelVersion": "claude-upstream"},
        })
        .to_string();

        let rewritten: Value = serde_json::from_str(&rewrite_payload(&raw, "claude-client")).unwrap();
        assert_eq!(rewritten["model"], "claude-client");
        assert_eq!(rewritten["message"]["model"], "claude-client");
        assert_eq!(rewritten["modelVersion"], "claude-client");
        assert_eq!(rewritten["response"]["model"], "claude-client");
        assert_eq!(rewritten["response"]["modelVersion"], "claude-client");
    }

    #[test]
    fn drops_thinking_block_when_tool_use_present() {
        let raw = json!({
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "tool_use", "name": "foo"},
            ]
        })
        .to_string();

        let rewritten: Value = serde_json::from_str(&rewrite_payload(&raw, "m")).unwrap();
        let content = rewritten["content"].as_array().unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0]["type"], "tool_use");
    }

    #[test]
    fn keeps_thinking_block_without_tool_use() {
        let raw = json!({"content": [{"type": "thinking", "thinking": "..."}]}).to_string();
        let rewritten: Value = serde_json::from_str(&rewrite_payload(&raw, "m")).unwrap();
        assert_eq!(rewritten["content"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn done_and_malformed_json_pass_through() {
        assert_eq!(rewrite_payload("[DONE]", "m"), "[DONE]");
        assert_eq!(rewrite_payload("not json", "m"), "not json");
    }
}
