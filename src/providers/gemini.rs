//! Gemini adapter (spec §4.H). Target endpoint, path parsing, and the CCA
//! envelope are grounded on `providers/antigravity/client/client.rs`'s
//! endpoint-building shape (the closest teacher analogue, since the teacher
//! ships no standalone Gemini-CLI-pool adapter at this granularity).

use crate::stream::envelope::{EnvelopeParams, GEMINI_ENVELOPE};

const PROD_ENDPOINT: &str = "https://cloudcode-pa.googleapis.com";

pub struct ParsedModelAction {
    pub model: String,
    pub action: String,
}

/// Parse `{model, action}` from a path shaped `…/models/<model>:<action>`.
/// Returns `None` if the path doesn't match (caller returns 401).
pub fn parse_path(path: &str) -> Option<ParsedModelAction> {
    let after_models = path.rsplit_once("models/")?.1;
    let (model, action) = after_models.split_once(':')?;
    if model.is_empty() || action.is_empty() || action.contains('/') {
        return None;
    }
    Some(ParsedModelAction {
        model: model.to_string(),
        action: action.to_string(),
    })
}

pub fn envelope_params() -> EnvelopeParams {
    GEMINI_ENVELOPE
}

/// `"{endpoint}/v1internal:{action}?alt=sse"` for streaming actions, else no
/// query string.
pub fn build_url(action: &str, stream: bool) -> String {
    if stream {
        format!("{PROD_ENDPOINT}/v1internal:{action}?alt=sse")
    } else {
        format!("{PROD_ENDPOINT}/v1internal:{action}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_model_and_action_from_path() {
        let parsed = parse_path("/v1/models/gemini-2.5-pro:streamGenerateContent").unwrap();
        assert_eq!(parsed.model, "gemini-2.5-pro");
        assert_eq!(parsed.action, "streamGenerateContent");
    }

    #[test]
    fn unrecognized_path_returns_none() {
        assert!(parse_path("/v1/unsupported").is_none());
    }

    #[test]
    fn stream_urls_carry_alt_sse_query() {
        assert!(build_url("streamGenerateContent", true).ends_with("?alt=sse"));
        assert!(!build_url("generateContent", false).contains('?'));
    }
}
