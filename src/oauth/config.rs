//! Per-provider OAuth configuration (spec §3 "OAuth provider configuration").
//!
//! These are compile-time constants, not user config — the four providers' OAuth
//! apps are fixed, matching the teacher's `providers/codex/client/oauth/endpoints.rs`
//! (`CODEX_CLIENT_ID`, fixed auth/token URLs) and `google_oauth/endpoints.rs`.

use crate::domain::Pool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    Json,
    Form,
}

#[derive(Debug, Clone, Copy)]
pub struct OauthProviderConfig {
    pub pool: Pool,
    pub client_id: &'static str,
    pub client_secret: Option<&'static str>,
    pub authorize_url: &'static str,
    pub token_url: &'static str,
    pub redirect_host: &'static str,
    pub callback_port: u16,
    pub callback_path: &'static str,
    pub scope: &'static str,
    pub body_encoding: BodyEncoding,
    pub include_state_in_exchange: bool,
    pub extra_authorize_params: &'static [(&'static str, &'static str)],
    pub apply_expiry_buffer: bool,
}

impl OauthProviderConfig {
    pub fn redirect_uri(&self) -> String {
        format!(
            "http://{}:{}{}",
            self.redirect_host, self.callback_port, self.callback_path
        )
    }

    pub fn for_pool(pool: Pool) -> &'static OauthProviderConfig {
        match pool {
            Pool::Anthropic => &ANTHROPIC,
            Pool::Codex => &CODEX,
            Pool::Gemini => &GEMINI,
            Pool::Antigravity => &ANTIGRAVITY,
        }
    }
}

/// Anthropic Console OAuth app used by `claude-cli`.
pub static ANTHROPIC: OauthProviderConfig = OauthProviderConfig {
    pool: Pool::Anthropic,
    client_id: "9d1c250a-e61b-44d9-88ed-5944d1962f5e",
    client_secret: None,
    authorize_url: "https://claude.ai/oauth/authorize",
    token_url: "https://console.anthropic.com/v1/oauth/token",
    redirect_host: "localhost",
    callback_port: 54545,
    callback_path: "/callback",
    scope: "org:create_api_key user:profile user:inference",
    body_encoding: BodyEncoding::Json,
    include_state_in_exchange: true,
    extra_authorize_params: &[("code", "true")],
    apply_expiry_buffer: true,
};

/// Fixed Codex CLI OAuth client (public client, no secret), matching the
/// teacher's `CodexOauthEndpoints`.
pub static CODEX: OauthProviderConfig = OauthProviderConfig {
    pool: Pool::Codex,
    client_id: "app_EMoamEEZ73f0CkXaXp7hrann",
    client_secret: None,
    authorize_url: "https://auth.openai.com/oauth/authorize",
    token_url: "https://auth.openai.com/oauth/token",
    redirect_host: "localhost",
    callback_port: 1455,
    callback_path: "/auth/callback",
    scope: "openid profile email offline_access",
    body_encoding: BodyEncoding::Json,
    include_state_in_exchange: false,
    extra_authorize_params: &[
        ("id_token_add_organizations", "true"),
        ("codex_cli_simplified_flow", "true"),
        ("originator", "codex_cli_rs"),
    ],
    apply_expiry_buffer: true,
};

/// Google OAuth client used by both the Gemini and Antigravity pools (shared
/// client id/scope; the two pools are stored as separate credential rows).
pub static GEMINI: OauthProviderConfig = OauthProviderConfig {
    pool: Pool::Gemini,
    client_id: "681255809395-oo8ft2oprdrnp9e3aqf6av3hmdib135j.apps.googleusercontent.com",
    client_secret: Some("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"),
    authorize_url: "https://accounts.google.com/o/oauth2/v2/auth",
    token_url: "https://oauth2.googleapis.com/token",
    redirect_host: "localhost",
    callback_port: 8085,
    callback_path: "/oauth2callback",
    scope: "https://www.googleapis.com/auth/cloud-platform https://www.googleapis.com/auth/userinfo.email https://www.googleapis.com/auth/userinfo.profile",
    body_encoding: BodyEncoding::Form,
    include_state_in_exchange: false,
    extra_authorize_params: &[("access_type", "offline"), ("prompt", "consent")],
    apply_expiry_buffer: true,
};

pub static ANTIGRAVITY: OauthProviderConfig = OauthProviderConfig {
    pool: Pool::Antigravity,
    client_id: "681255809395-oo8ft2oprdrnp9e3aqf6av3hmdib135j.apps.googleusercontent.com",
    client_secret: Some("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"),
    authorize_url: "https://accounts.google.com/o/oauth2/v2/auth",
    token_url: "https://oauth2.googleapis.com/token",
    redirect_host: "localhost",
    callback_port: 8086,
    callback_path: "/oauth2callback",
    scope: "https://www.googleapis.com/auth/cloud-platform https://www.googleapis.com/auth/userinfo.email https://www.googleapis.com/auth/userinfo.profile",
    body_encoding: BodyEncoding::Form,
    include_state_in_exchange: false,
    extra_authorize_params: &[("access_type", "offline"), ("prompt", "consent")],
    apply_expiry_buffer: true,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_uri_is_localhost_bound() {
        assert_eq!(CODEX.redirect_uri(), "http://localhost:1455/auth/callback");
    }

    #[test]
    fn antigravity_inherits_google_client_but_not_pool() {
        assert_eq!(ANTIGRAVITY.pool, Pool::Antigravity);
        assert_eq!(ANTIGRAVITY.client_id, GEMINI.client_id);
        assert_ne!(ANTIGRAVITY.callback_port, GEMINI.callback_port);
    }
}
