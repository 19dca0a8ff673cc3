//! SQL DDL for the credential store.
//!
//! A single table keyed by `(provider, account)` holds every stored OAuth
//! subscription, across all four pools — see `DESIGN.md` for why this departs
//! from a per-provider-table layout.

pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS credentials (
    id INTEGER PRIMARY KEY NOT NULL,
    provider TEXT NOT NULL,
    account INTEGER NOT NULL,
    email TEXT NULL,
    account_id TEXT NULL,
    project_id TEXT NULL,
    access_token TEXT NULL,
    refresh_token TEXT NOT NULL,
    expires_at_ms INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(provider, account)
);

CREATE INDEX IF NOT EXISTS idx_credentials_provider ON credentials(provider);
"#;
