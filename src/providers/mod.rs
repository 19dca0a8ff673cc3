//! Provider Adapters (spec §4.H): per-pool header/URL shaping plus the
//! shared retrying POST.

pub mod anthropic;
pub mod antigravity;
pub mod codex;
pub mod common;
pub mod gemini;
