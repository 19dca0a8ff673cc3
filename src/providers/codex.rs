//! Codex adapter (spec §4.H). Headers grounded on
//! `providers/codex/client/api.rs::build_codex_request`; body transform lives
//! in `amprelay-schema::codex`.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

const BACKEND_BASE: &str = "https://chatgpt.com/backend-api";
const RESPONSES_PATH: &str = "/codex/responses";
const USER_AGENT: &str = "codex_cli_rs/0.1.0 (Rust; amprelay)";
const VERSION: &str = "0.1.0";
const ORIGINATOR: &str = "codex_cli_rs";

pub fn responses_url() -> String {
    format!("{BACKEND_BASE}{RESPONSES_PATH}")
}

/// `{/v1/responses, /v1/chat/completions}` both map onto the single Codex
/// Responses-API backend path.
pub fn maps_to_codex_responses(path: &str) -> bool {
    path == "/v1/responses" || path == "/v1/chat/completions"
}

pub fn build_headers(access_token: &str, chatgpt_account_id: &str, thread_id: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(
        reqwest::header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {access_token}")).expect("bearer token is valid ascii"),
    );
    headers.insert(
        HeaderName::from_static("chatgpt-account-id"),
        HeaderValue::from_str(chatgpt_account_id).expect("account id is valid ascii"),
    );
    headers.insert(
        HeaderName::from_static("openai-beta"),
        HeaderValue::from_static("responses=experimental"),
    );
    headers.insert(
        HeaderName::from_static("originator"),
        HeaderValue::from_static(ORIGINATOR),
    );
    headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_static(USER_AGENT),
    );
    headers.insert(
        HeaderName::from_static("version"),
        HeaderValue::from_static(VERSION),
    );
    headers.insert(
        reqwest::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    if let Some(thread_id) = thread_id {
        if let Ok(value) = HeaderValue::from_str(thread_id) {
            headers.insert(HeaderName::from_static("session_id"), value.clone());
            headers.insert(HeaderName::from_static("conversation_id"), value);
        }
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_legacy_paths_map_to_codex_responses() {
        assert!(maps_to_codex_responses("/v1/responses"));
        assert!(maps_to_codex_responses("/v1/chat/completions"));
        assert!(!maps_to_codex_responses("/v1/embeddings"));
    }

    #[test]
    fn thread_id_is_echoed_as_session_and_conversation_id() {
        let headers = build_headers("at", "acct", Some("thread-1"));
        assert_eq!(headers.get("session_id").unwrap(), "thread-1");
        assert_eq!(headers.get("conversation_id").unwrap(), "thread-1");
    }
}
