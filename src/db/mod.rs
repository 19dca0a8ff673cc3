//! Credential store: a single-writer actor fronting a SQLite table of
//! per-(provider, account) OAuth subscriptions.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database
//! - `actor.rs`: the `CredentialActor` and its RPC handle

pub mod actor;
pub mod models;
pub mod schema;

pub use actor::{CredentialActorHandle, spawn};
pub use models::Credentials;
pub use schema::SQLITE_INIT;
