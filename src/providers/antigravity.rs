//! Antigravity adapter (spec §4.H). Same wire shape as Gemini but tries a
//! cascade of endpoints, grounded on
//! `providers/antigravity/client/client.rs`'s `daily-cloudcode-pa.googleapis.com`
//! default and endpoint-building pattern.

use crate::stream::envelope::{ANTIGRAVITY_ENVELOPE, EnvelopeParams};

/// Advances on any HTTP ≥ 500 or connect error.
pub const ENDPOINT_CASCADE: [&str; 3] = [
    "https://daily-cloudcode-pa.googleapis.com",
    "https://autopush-cloudcode-pa.googleapis.com",
    "https://cloudcode-pa.googleapis.com",
];

pub fn envelope_params() -> EnvelopeParams {
    ANTIGRAVITY_ENVELOPE
}

pub fn build_url(endpoint: &str, action: &str, stream: bool) -> String {
    if stream {
        format!("{endpoint}/v1internal:{action}?alt=sse")
    } else {
        format!("{endpoint}/v1internal:{action}")
    }
}

pub fn should_advance_to_next_endpoint(status: Option<reqwest::StatusCode>, is_connect_error: bool) -> bool {
    is_connect_error || status.is_some_and(|s| s.is_server_error())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cascade_order_is_daily_autopush_prod() {
        assert_eq!(ENDPOINT_CASCADE[0], "https://daily-cloudcode-pa.googleapis.com");
        assert_eq!(ENDPOINT_CASCADE[2], "https://cloudcode-pa.googleapis.com");
    }

    #[test]
    fn advances_on_5xx_or_connect_error() {
        assert!(should_advance_to_next_endpoint(
            Some(reqwest::StatusCode::BAD_GATEWAY),
            false
        ));
        assert!(should_advance_to_next_endpoint(None, true));
        assert!(!should_advance_to_next_endpoint(
            Some(reqwest::StatusCode::OK),
            false
        ));
    }
}
