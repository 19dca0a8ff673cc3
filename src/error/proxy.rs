use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error as ThisError;

use super::IsRetryable;
use super::oauth::OauthError;

/// Error taxonomy per the unhandled-errors-never-propagate-silently rule: every
/// variant maps to a concrete HTTP response so the pipeline's outer handler never
/// needs to guess.
#[derive(Debug, ThisError)]
pub enum ProxyError {
    #[error(transparent)]
    Oauth(#[from] OauthError),

    #[error("upstream returned status {0}")]
    UpstreamStatus(StatusCode),

    #[error("http request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("ractor error: {0}")]
    Ractor(String),

    #[error("no available credential for this pool")]
    NoAvailableCredential,

    #[error("credential store corruption for {provider}/{account}, row deleted")]
    CredentialCorrupt { provider: String, account: i64 },

    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl IsRetryable for ProxyError {
    fn is_retryable(&self) -> bool {
        match self {
            ProxyError::Reqwest(_) => true,
            ProxyError::UpstreamStatus(status) => {
                matches!(status.as_u16(), 408 | 500 | 502 | 503 | 504)
            }
            ProxyError::Oauth(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match &self {
            ProxyError::Oauth(OauthError::StateMismatch) => (
                StatusCode::BAD_REQUEST,
                ApiErrorObject::new("OAUTH_STATE_MISMATCH", "possible CSRF"),
            ),
            ProxyError::Oauth(OauthError::MissingRefreshToken) => (
                StatusCode::BAD_REQUEST,
                ApiErrorObject::new(
                    "OAUTH_MISSING_REFRESH_TOKEN",
                    "Revoke app access and try again",
                ),
            ),
            ProxyError::Oauth(OauthError::CallbackTimeout) => (
                StatusCode::GATEWAY_TIMEOUT,
                ApiErrorObject::new("OAUTH_CALLBACK_TIMEOUT", "login callback timed out"),
            ),
            ProxyError::Oauth(_) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorObject::new("OAUTH_ERROR", "oauth provider error"),
            ),
            ProxyError::UpstreamStatus(code) => {
                let obj = ApiErrorObject::new("UPSTREAM_ERROR", "upstream error");
                (*code, obj)
            }
            ProxyError::NoAvailableCredential => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiErrorObject::new("NO_CREDENTIAL", "no available credential"),
            ),
            ProxyError::CredentialCorrupt { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiErrorObject::new("NO_CREDENTIAL", "account appears absent"),
            ),
            ProxyError::ConfigInvalid(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorObject::new("CONFIG_INVALID", "Internal proxy error"),
            ),
            ProxyError::Reqwest(_) | ProxyError::Url(_) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorObject::new("UPSTREAM_ERROR", "upstream connection error"),
            ),
            ProxyError::Json(_) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorObject::new("BAD_UPSTREAM_PAYLOAD", "failed to parse upstream response"),
            ),
            ProxyError::Io(_) | ProxyError::Database(_) | ProxyError::Ractor(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorObject::new("INTERNAL_ERROR", "Internal proxy error"),
            ),
            ProxyError::Unexpected(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorObject::new("INTERNAL_ERROR", "Internal proxy error"),
            ),
        };
        (status, Json(ApiErrorBody { error: body })).into_response()
    }
}

#[derive(Serialize)]
pub struct ApiErrorObject {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ApiErrorObject {
    fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            details: None,
        }
    }
}

#[derive(Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorObject,
}
