use serde::{Deserialize, Serialize};

use crate::domain::{Account, Pool};

/// Per-(provider, account) credential record (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: String,
    /// Absolute ms since epoch.
    pub expires_at: i64,
    pub project_id: Option<String>,
    pub email: Option<String>,
    pub account_id: Option<String>,
}

impl Credentials {
    /// `fresh(c) := now < c.expiresAt`
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at
    }

    /// A record with no refresh token cannot back new flows, though it is not
    /// automatically deleted.
    pub fn is_usable(&self) -> bool {
        !self.refresh_token.trim().is_empty()
    }

    /// Match existing accounts by identity (non-empty `email` or `accountId`).
    pub fn matches_identity(&self, email: Option<&str>, account_id: Option<&str>) -> bool {
        if let (Some(a), Some(b)) = (account_id, self.account_id.as_deref()) {
            if !a.is_empty() && a == b {
                return true;
            }
        }
        if let (Some(a), Some(b)) = (email, self.email.as_deref()) {
            if !a.is_empty() && a == b {
                return true;
            }
        }
        false
    }
}

pub(crate) struct CredentialRow {
    pub pool: Pool,
    pub account: Account,
    pub credentials: Credentials,
}

pub(crate) fn parse_pool(s: &str) -> Option<Pool> {
    match s {
        "anthropic" => Some(Pool::Anthropic),
        "codex" => Some(Pool::Codex),
        "gemini" => Some(Pool::Gemini),
        "antigravity" => Some(Pool::Antigravity),
        _ => None,
    }
}
