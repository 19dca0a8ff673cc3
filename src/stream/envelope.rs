//! Cloud Code Assist envelope wrap/unwrap (spec §4.G(c)).

use serde_json::{Value, json};

#[derive(Debug, Clone, Copy)]
pub struct EnvelopeParams {
    pub user_agent: &'static str,
    pub request_id_prefix: &'static str,
}

pub const GEMINI_ENVELOPE: EnvelopeParams = EnvelopeParams {
    user_agent: "pi-coding-agent",
    request_id_prefix: "pi",
};

pub const ANTIGRAVITY_ENVELOPE: EnvelopeParams = EnvelopeParams {
    user_agent: "antigravity",
    request_id_prefix: "agent",
};

/// Outbound wrap: if `body` doesn't already carry `project`, wrap it.
/// `request_type` is only included for callers that pass one (Antigravity).
pub fn wrap(
    body: Value,
    project: &str,
    model: &str,
    request_type: Option<&str>,
    params: EnvelopeParams,
    now_ms: i64,
) -> Value {
    if body.get("project").is_some() {
        return body;
    }

    use rand::RngCore;
    let mut rng_suffix = [0u8; 4];
    rand::rng().fill_bytes(&mut rng_suffix);
    let request_id = format!(
        "{}-{now_ms}-{}",
        params.request_id_prefix,
        rng_suffix.iter().map(|b| format!("{b:02x}")).collect::<String>()
    );

    let mut envelope = json!({
        "project": project,
        "model": model,
        "request": body,
        "userAgent": params.user_agent,
        "requestId": request_id,
    });

    if let Some(request_type) = request_type {
        envelope["requestType"] = Value::String(request_type.to_string());
    }

    envelope
}

/// Inbound unwrap: each SSE data payload is `{response: X, traceId: Y}`;
/// emit the inner `X`. `[DONE]` is suppressed entirely (returns `None`).
pub fn unwrap(raw: &str) -> Option<String> {
    if raw == "[DONE]" {
        return None;
    }
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return Some(raw.to_string());
    };
    let inner = value.get("response").cloned().unwrap_or(value);
    Some(serde_json::to_string(&inner).unwrap_or_else(|_| raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wrap_adds_envelope_fields() {
        let body = json!({"contents": []});
        let wrapped = wrap(body, "proj-1", "gemini-pro", None, GEMINI_ENVELOPE, 1_000);
        assert_eq!(wrapped["project"], "proj-1");
        assert_eq!(wrapped["model"], "gemini-pro");
        assert_eq!(wrapped["userAgent"], "pi-coding-agent");
        assert!(wrapped["requestId"].as_str().unwrap().starts_with("pi-1000-"));
    }

    #[test]
    fn wrap_is_noop_if_project_already_present() {
        let body = json!({"project": "already-there"});
        let wrapped = wrap(body.clone(), "proj-1", "m", None, GEMINI_ENVELOPE, 1_000);
        assert_eq!(wrapped, body);
    }

    #[test]
    fn antigravity_wrap_includes_request_type() {
        let wrapped = wrap(json!({}), "p", "m", Some("agent"), ANTIGRAVITY_ENVELOPE, 1);
        assert_eq!(wrapped["requestType"], "agent");
    }

    #[test]
    fn unwrap_extracts_inner_response_and_suppresses_done() {
        assert_eq!(unwrap("[DONE]"), None);
        let inner = unwrap(r#"{"response": {"text": "hi"}, "traceId": "t"}"#).unwrap();
        assert_eq!(inner, r#"{"text":"hi"}"#);
    }
}
