//! Shared identifiers used across the credential store, OAuth engine, cooldown
//! tracker, affinity map and router. Kept as simple `Copy` enums rather than
//! strings so routing decisions are exhaustively matched at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A quota bucket identity. A single Google credential may back two pools
/// (`Gemini` and `Antigravity`) stored as independent rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pool {
    Anthropic,
    Codex,
    Gemini,
    Antigravity,
}

impl Pool {
    pub const ALL: [Pool; 4] = [Pool::Anthropic, Pool::Codex, Pool::Gemini, Pool::Antigravity];

    pub fn as_str(self) -> &'static str {
        match self {
            Pool::Anthropic => "anthropic",
            Pool::Codex => "codex",
            Pool::Gemini => "gemini",
            Pool::Antigravity => "antigravity",
        }
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three surfaces the client actually requests by path (`/api/provider/<this>/...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientProvider {
    Anthropic,
    Openai,
    Google,
}

impl ClientProvider {
    pub fn from_path_segment(s: &str) -> Option<Self> {
        match s {
            "anthropic" => Some(ClientProvider::Anthropic),
            "openai" => Some(ClientProvider::Openai),
            "google" => Some(ClientProvider::Google),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClientProvider::Anthropic => "anthropic",
            ClientProvider::Openai => "openai",
            ClientProvider::Google => "google",
        }
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A slot within a pool; densely numbered from 0.
pub type Account = i64;

/// A logical conversation identified by the client's `x-amp-thread-id` header.
pub type ThreadId = String;

/// Route decision tags used in logging and stats (spec §4.I).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTag {
    LocalClaude,
    LocalCodex,
    LocalGemini,
    LocalAntigravity,
    AmpUpstream,
}

impl RouteTag {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteTag::LocalClaude => "LOCAL_CLAUDE",
            RouteTag::LocalCodex => "LOCAL_CODEX",
            RouteTag::LocalGemini => "LOCAL_GEMINI",
            RouteTag::LocalAntigravity => "LOCAL_ANTIGRAVITY",
            RouteTag::AmpUpstream => "AMP_UPSTREAM",
        }
    }

    pub fn for_pool(pool: Pool) -> Self {
        match pool {
            Pool::Anthropic => RouteTag::LocalClaude,
            Pool::Codex => RouteTag::LocalCodex,
            Pool::Gemini => RouteTag::LocalGemini,
            Pool::Antigravity => RouteTag::LocalAntigravity,
        }
    }
}

impl fmt::Display for RouteTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
