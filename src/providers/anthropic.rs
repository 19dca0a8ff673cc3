//! Anthropic adapter (spec §4.H). No teacher file exists for this provider —
//! grounded on the *shape* of the Codex/Gemini adapters (`forward`,
//! header-building, retry) in this module, with the header set named
//! explicitly in spec.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const USER_AGENT: &str = "claude-cli/1.0.0 (external, cli)";

const FIXED_BETA_FEATURES: [&str; 4] = [
    "claude-code-20250219",
    "oauth-2025-04-20",
    "interleaved-thinking-2025-05-14",
    "prompt-caching-scope-2026-01-05",
];

const DENYLISTED_BETA_FEATURE: &str = "context-1m-2025-08-07";

pub fn base_url(sub_path: &str) -> String {
    format!("https://api.anthropic.com{sub_path}")
}

/// Build the Anthropic request headers: the fixed "stainless" set plus the
/// beta-feature union (fixed set ∪ client's `anthropic-beta`, minus the
/// denylisted feature).
pub fn build_headers(access_token: &str, client_anthropic_beta: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(
        reqwest::header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {access_token}")).expect("bearer token is valid ascii"),
    );
    headers.insert(
        HeaderName::from_static("anthropic-version"),
        HeaderValue::from_static(ANTHROPIC_VERSION),
    );
    headers.insert(
        HeaderName::from_static("anthropic-dangerous-direct-browser-access"),
        HeaderValue::from_static("true"),
    );
    headers.insert(
        HeaderName::from_static("anthropic-beta"),
        HeaderValue::from_str(&merged_beta_header(client_anthropic_beta))
            .expect("beta header is valid ascii"),
    );
    headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_static(USER_AGENT),
    );
    headers.insert(
        HeaderName::from_static("x-app"),
        HeaderValue::from_static("cli"),
    );
    headers.insert(
        reqwest::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    headers
}

fn merged_beta_header(client_anthropic_beta: Option<&str>) -> String {
    let mut features: Vec<&str> = FIXED_BETA_FEATURES.to_vec();

    if let Some(client_features) = client_anthropic_beta {
        for feature in client_features.split(',').map(str::trim) {
            if !feature.is_empty() && feature != DENYLISTED_BETA_FEATURE && !features.contains(&feature) {
                features.push(feature);
            }
        }
    }

    features.retain(|f| *f != DENYLISTED_BETA_FEATURE);
    features.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beta_header_unions_fixed_and_client_features() {
        let merged = merged_beta_header(Some("fine-grained-tool-streaming-2025-05-14"));
        assert!(merged.contains("claude-code-20250219"));
        assert!(merged.contains("fine-grained-tool-streaming-2025-05-14"));
    }

    #[test]
    fn beta_header_excludes_denylisted_feature_even_if_client_requests_it() {
        let merged = merged_beta_header(Some(DENYLISTED_BETA_FEATURE));
        assert!(!merged.contains(DENYLISTED_BETA_FEATURE));
    }

    #[test]
    fn beta_header_dedupes_repeated_features() {
        let merged = merged_beta_header(Some("oauth-2025-04-20"));
        assert_eq!(merged.matches("oauth-2025-04-20").count(), 1);
    }
}
