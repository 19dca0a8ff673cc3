use super::IsRetryable;
use axum::http::StatusCode;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum OauthError {
    #[error("possible CSRF: callback state did not match")]
    StateMismatch,

    #[error("no refresh token in response and none stored for this slot")]
    MissingRefreshToken,

    #[error("oauth callback listener timed out after 120s")]
    CallbackTimeout,

    #[error("token endpoint returned {status}: {body}")]
    TokenExchangeFailed { status: StatusCode, body: String },

    #[error("oauth http error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("oauth response parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("identity extraction failed: {0}")]
    Identity(String),
}

impl IsRetryable for OauthError {
    fn is_retryable(&self) -> bool {
        match self {
            OauthError::Request(_) => true,
            OauthError::TokenExchangeFailed { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }
}
