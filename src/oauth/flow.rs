//! Interactive login protocol: authorize URL, scoped callback listener, code
//! exchange (spec §4.B "Login protocol").

use std::time::Duration;

use axum::{Router, extract::Query, response::Html, routing::get};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use url::Url;

use super::config::{BodyEncoding, OauthProviderConfig};
use super::identity::{self, Identity};
use super::pkce;
use crate::db::{CredentialActorHandle, Credentials};
use crate::error::OauthError;

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);
const EXPIRY_BUFFER_MS: i64 = 5 * 60 * 1000;

/// Result of a successful exchange, before identity matching is applied.
struct TokenExchange {
    access_token: String,
    refresh_token: Option<String>,
    expires_in_s: i64,
    raw: Value,
}

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

fn build_authorize_url(
    cfg: &OauthProviderConfig,
    challenge: &oauth2::PkceCodeChallenge,
    state: &str,
) -> Url {
    let mut url = Url::parse(cfg.authorize_url).expect("static authorize url is valid");
    {
        let mut q = url.query_pairs_mut();
        q.append_pair("client_id", cfg.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &cfg.redirect_uri())
            .append_pair("scope", cfg.scope)
            .append_pair("code_challenge", challenge.as_str())
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", state);
        for (k, v) in cfg.extra_authorize_params {
            q.append_pair(k, v);
        }
    }
    url
}

/// Wait for exactly one callback hit on `cfg`'s redirect host/port/path, or
/// time out after 120 s.
async fn await_callback(cfg: &OauthProviderConfig) -> Result<CallbackParams, OauthError> {
    let (tx, rx) = oneshot::channel::<CallbackParams>();
    let tx = std::sync::Arc::new(std::sync::Mutex::new(Some(tx)));
    let path = cfg.callback_path.to_string();

    let app = Router::new().route(
        &path,
        get(move |Query(params): Query<CallbackParams>| {
            let tx = tx.lock().expect("callback mutex poisoned").take();
            async move {
                if let Some(tx) = tx {
                    let _ = tx.send(params);
                }
                Html("<html><body>Login complete, you may close this tab.</body></html>")
            }
        }),
    );

    let addr = format!("127.0.0.1:{}", cfg.callback_port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| OauthError::Identity(format!("failed to bind callback listener: {e}")))?;

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let result = tokio::time::timeout(CALLBACK_TIMEOUT, rx)
        .await
        .map_err(|_| OauthError::CallbackTimeout)?
        .map_err(|_| OauthError::Identity("callback channel closed unexpectedly".to_string()))?;

    server.abort();
    Ok(result)
}

fn open_browser_or_print(url: &Url) {
    if webbrowser::open(url.as_str()).is_err() {
        println!("Open this URL to continue: {url}");
    }
}

async fn exchange_code(
    cfg: &OauthProviderConfig,
    code: &str,
    verifier: &oauth2::PkceCodeVerifier,
    state: &str,
    http: &reqwest::Client,
) -> Result<TokenExchange, OauthError> {
    let redirect_uri = cfg.redirect_uri();
    let mut fields: Vec<(&str, &str)> = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri.as_str()),
        ("client_id", cfg.client_id),
        ("code_verifier", verifier.secret()),
    ];
    if let Some(secret) = cfg.client_secret {
        fields.push(("client_secret", secret));
    }
    if cfg.include_state_in_exchange {
        fields.push(("state", state));
    }

    let request = http.post(cfg.token_url);
    let request = match cfg.body_encoding {
        BodyEncoding::Json => {
            let obj: serde_json::Map<String, Value> = fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect();
            request.json(&Value::Object(obj))
        }
        BodyEncoding::Form => request.form(&fields),
    };

    let response = request.send().await?;
    let status = response.status();
    let body: Value = response.json().await?;

    if !status.is_success() {
        return Err(OauthError::TokenExchangeFailed {
            status,
            body: body.to_string(),
        });
    }

    let access_token = body
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or_else(|| OauthError::Identity("token response missing access_token".to_string()))?
        .to_string();
    let refresh_token = body
        .get("refresh_token")
        .and_then(Value::as_str)
        .map(str::to_string);
    let expires_in_s = body.get("expires_in").and_then(Value::as_i64).unwrap_or(3600);

    Ok(TokenExchange {
        access_token,
        refresh_token,
        expires_in_s,
        raw: body,
    })
}

fn compute_expires_at(now_ms: i64, expires_in_s: i64, apply_buffer: bool) -> i64 {
    let raw = now_ms + expires_in_s * 1000;
    if apply_buffer { raw - EXPIRY_BUFFER_MS } else { raw }
}

/// Run the full interactive login protocol and persist the resulting
/// credential, returning it.
pub async fn login(
    cfg: &OauthProviderConfig,
    db: &CredentialActorHandle,
    http: &reqwest::Client,
) -> Result<Credentials, OauthError> {
    let verifier = pkce::generate_verifier();
    let challenge = pkce::challenge_for(&verifier);
    let state = pkce::generate_state();

    let authorize_url = build_authorize_url(cfg, &challenge, &state);
    open_browser_or_print(&authorize_url);

    let params = await_callback(cfg).await?;

    if let Some(err) = params.error {
        return Err(OauthError::Identity(format!("authorize error: {err}")));
    }
    let returned_state = params.state.unwrap_or_default();
    if !constant_time_eq(returned_state.as_bytes(), state.as_bytes()) {
        return Err(OauthError::StateMismatch);
    }
    let code = params
        .code
        .ok_or_else(|| OauthError::Identity("callback missing code".to_string()))?;

    let exchange = exchange_code(cfg, &code, &verifier, &state, http).await?;
    let identity = identity::extract(cfg.pool, &exchange.access_token, &exchange.raw, http).await?;

    let existing_account = db
        .find_by_identity(cfg.pool, identity.email.clone(), identity.account_id.clone())
        .await
        .map_err(|e| OauthError::Identity(e.to_string()))?;

    let account = match existing_account {
        Some(a) => a,
        None => db
            .next_account(cfg.pool)
            .await
            .map_err(|e| OauthError::Identity(e.to_string()))?,
    };

    let refresh_token = match (exchange.refresh_token, existing_account) {
        (Some(rt), _) => rt,
        (None, Some(a)) => db
            .get(cfg.pool, a)
            .await
            .ok()
            .flatten()
            .map(|c| c.refresh_token)
            .ok_or(OauthError::MissingRefreshToken)?,
        (None, None) => return Err(OauthError::MissingRefreshToken),
    };

    let now_ms = crate::clock::now_ms();
    let credentials = Credentials {
        access_token: Some(exchange.access_token),
        refresh_token,
        expires_at: compute_expires_at(now_ms, exchange.expires_in_s, cfg.apply_expiry_buffer),
        project_id: identity.project_id,
        email: identity.email,
        account_id: identity.account_id,
    };

    db.save(cfg.pool, account, credentials.clone())
        .await
        .map_err(|e| OauthError::Identity(e.to_string()))?;

    Ok(credentials)
}

/// POST `grant_type=refresh_token` and merge the result onto the prior record.
pub async fn refresh(
    cfg: &OauthProviderConfig,
    prior: &Credentials,
    http: &reqwest::Client,
) -> Result<Credentials, OauthError> {
    let fields: Vec<(&str, &str)> = {
        let mut v = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", prior.refresh_token.as_str()),
            ("client_id", cfg.client_id),
        ];
        if let Some(secret) = cfg.client_secret {
            v.push(("client_secret", secret));
        }
        v
    };

    let request = http.post(cfg.token_url);
    let request = match cfg.body_encoding {
        BodyEncoding::Json => {
            let obj: serde_json::Map<String, Value> = fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect();
            request.json(&Value::Object(obj))
        }
        BodyEncoding::Form => request.form(&fields),
    };

    let response = request.send().await?;
    let status = response.status();
    let body: Value = response.json().await?;
    if !status.is_success() {
        return Err(OauthError::TokenExchangeFailed {
            status,
            body: body.to_string(),
        });
    }

    let access_token = body
        .get("access_token")
        .and_then(Value::as_str)
        .map(str::to_string);
    let refresh_token = body
        .get("refresh_token")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| prior.refresh_token.clone());
    let expires_in_s = body.get("expires_in").and_then(Value::as_i64).unwrap_or(3600);
    let now_ms = crate::clock::now_ms();

    Ok(Credentials {
        access_token: access_token.or_else(|| prior.access_token.clone()),
        refresh_token,
        expires_at: compute_expires_at(now_ms, expires_in_s, cfg.apply_expiry_buffer),
        project_id: prior.project_id.clone(),
        email: prior.email.clone(),
        account_id: prior.account_id.clone(),
    })
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.len() == b.len() && a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_buffer_subtracts_five_minutes() {
        let now = 1_000_000_000_000;
        let with_buffer = compute_expires_at(now, 3600, true);
        let without_buffer = compute_expires_at(now, 3600, false);
        assert_eq!(without_buffer - with_buffer, EXPIRY_BUFFER_MS);
    }

    #[test]
    fn constant_time_eq_rejects_mismatched_state() {
        assert!(!constant_time_eq(b"aaaa", b"bbbb"));
        assert!(constant_time_eq(b"match", b"match"));
    }
}
