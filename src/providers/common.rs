//! Common `forward()` helper shared by all four provider adapters (spec
//! §4.H). Grounded on `providers/upstream_retry.rs::post_json_with_retry`
//! and `providers/codex/client/api.rs::try_post_codex`'s retry shape.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};

use crate::error::ProxyError;

const TRANSIENT_STATUSES: [StatusCode; 5] = [
    StatusCode::REQUEST_TIMEOUT,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_UNIT_MS: u64 = 500;

pub struct ForwardRequest<'a> {
    pub client: &'a reqwest::Client,
    pub url: url::Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// POST `request.body` to `request.url`, retrying transient errors (network
/// failure or status ∈ {408, 500, 502, 503, 504}) up to 3 times with backoff
/// `500ms * attempt`. 429 is never retried here — the router layer owns that.
pub async fn forward(request: ForwardRequest<'_>) -> Result<Response, ProxyError> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let outcome = request
            .client
            .post(request.url.clone())
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send()
            .await;

        match outcome {
            Ok(resp) if TRANSIENT_STATUSES.contains(&resp.status()) && attempt < MAX_ATTEMPTS => {
                tracing::debug!(status = %resp.status(), attempt, "transient upstream error, retrying");
                tokio::time::sleep(Duration::from_millis(BACKOFF_UNIT_MS * u64::from(attempt))).await;
            }
            Ok(resp) => return Ok(resp),
            Err(e) if attempt < MAX_ATTEMPTS => {
                tracing::debug!(error = %e, attempt, "transient network error, retrying");
                tokio::time::sleep(Duration::from_millis(BACKOFF_UNIT_MS * u64::from(attempt))).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Rate-limit / request-id headers forwarded bit-exact on SSE proxying.
pub const FORWARDED_HEADER_NAMES: &[&str] = &[
    "x-request-id",
    "request-id",
    "anthropic-ratelimit-requests-limit",
    "anthropic-ratelimit-requests-remaining",
    "anthropic-ratelimit-tokens-limit",
    "anthropic-ratelimit-tokens-remaining",
    "x-ratelimit-limit-requests",
    "x-ratelimit-remaining-requests",
    "x-ratelimit-limit-tokens",
    "x-ratelimit-remaining-tokens",
];

pub fn copy_forwarded_headers(src: &HeaderMap, dst: &mut HeaderMap) {
    for name in FORWARDED_HEADER_NAMES {
        if let Some(value) = src.get(*name) {
            dst.insert(
                reqwest::header::HeaderName::from_static(name),
                value.clone(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses_exclude_429() {
        assert!(!TRANSIENT_STATUSES.contains(&StatusCode::TOO_MANY_REQUESTS));
        assert!(TRANSIENT_STATUSES.contains(&StatusCode::BAD_GATEWAY));
    }
}
