//! Pluggable per-provider identity extraction (spec §4.B).

use serde_json::Value;

use crate::domain::Pool;
use crate::error::OauthError;
use crate::utils::jwt::decode_jwt_claims;

/// The fields used to re-match an existing account slot on re-login, plus
/// whatever the pool needs carried onto the stored credential row.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub email: Option<String>,
    pub account_id: Option<String>,
    pub project_id: Option<String>,
}

const CODE_ASSIST_ENDPOINTS: [&str; 3] = [
    "https://cloudcode-pa.googleapis.com",
    "https://daily-cloudcode-pa.googleapis.com",
    "https://autopush-cloudcode-pa.googleapis.com",
];

const FALLBACK_PROJECT_ID: &str = "amprelay-fallback-project";

/// Run the identity-extraction hook for `pool` against a freshly obtained
/// access token (and the raw token response, for Anthropic's embedded account
/// fields).
pub async fn extract(
    pool: Pool,
    access_token: &str,
    token_response: &Value,
    http: &reqwest::Client,
) -> Result<Identity, OauthError> {
    match pool {
        Pool::Anthropic => Ok(extract_anthropic(token_response)),
        Pool::Codex => extract_codex(access_token, http).await,
        Pool::Gemini | Pool::Antigravity => extract_google(access_token, http).await,
    }
}

fn extract_anthropic(token_response: &Value) -> Identity {
    let account = token_response.get("account");
    Identity {
        email: account
            .and_then(|a| a.get("email_address"))
            .and_then(Value::as_str)
            .map(str::to_string),
        account_id: account
            .and_then(|a| a.get("uuid"))
            .and_then(Value::as_str)
            .map(str::to_string),
        project_id: None,
    }
}

async fn extract_codex(access_token: &str, http: &reqwest::Client) -> Result<Identity, OauthError> {
    let claims = decode_jwt_claims(access_token)
        .ok_or_else(|| OauthError::Identity("failed to decode access token claims".to_string()))?;

    let account_id = claims
        .get("https://api.openai.com/auth")
        .and_then(Value::as_object)
        .and_then(|o| o.get("chatgpt_account_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            OauthError::Identity(
                "missing https://api.openai.com/auth.chatgpt_account_id claim".to_string(),
            )
        })?;

    let email = match http
        .get("https://chatgpt.com/backend-api/me")
        .bearer_auth(access_token)
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => resp
            .json::<Value>()
            .await
            .ok()
            .and_then(|v| v.get("email").and_then(Value::as_str).map(str::to_string)),
        _ => None,
    };

    Ok(Identity {
        email,
        account_id: Some(account_id),
        project_id: None,
    })
}

async fn extract_google(access_token: &str, http: &reqwest::Client) -> Result<Identity, OauthError> {
    let email = http
        .get("https://www.googleapis.com/oauth2/v2/userinfo")
        .bearer_auth(access_token)
        .send()
        .await?
        .json::<Value>()
        .await
        .ok()
        .and_then(|v| v.get("email").and_then(Value::as_str).map(str::to_string));

    let project_id = discover_project(access_token, http).await;

    Ok(Identity {
        email,
        account_id: None,
        project_id: Some(project_id),
    })
}

async fn discover_project(access_token: &str, http: &reqwest::Client) -> String {
    let body = serde_json::json!({
        "metadata": {
            "ideType": "IDE_UNSPECIFIED",
            "platform": "PLATFORM_UNSPECIFIED",
            "pluginType": "GEMINI",
        }
    });

    for endpoint in CODE_ASSIST_ENDPOINTS {
        let url = format!("{endpoint}/v1internal:loadCodeAssist");
        let Ok(resp) = http
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
        else {
            continue;
        };
        let Ok(value) = resp.json::<Value>().await else {
            continue;
        };
        if let Some(project) = value.get("cloudaicompanionProject") {
            if let Some(s) = project.as_str() {
                return s.to_string();
            }
            if let Some(id) = project.get("id").and_then(Value::as_str) {
                return id.to_string();
            }
        }
    }

    tracing::warn!("loadCodeAssist failed on all endpoints; using fallback project id");
    FALLBACK_PROJECT_ID.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn anthropic_identity_reads_embedded_account() {
        let resp = json!({"account": {"email_address": "a@example.com", "uuid": "u-1"}});
        let id = extract_anthropic(&resp);
        assert_eq!(id.email.as_deref(), Some("a@example.com"));
        assert_eq!(id.account_id.as_deref(), Some("u-1"));
    }
}
