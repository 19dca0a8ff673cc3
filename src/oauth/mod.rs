//! OAuth Engine: PKCE login, refresh, and per-provider identity extraction.

pub mod config;
mod engine;
mod flow;
mod identity;
mod pkce;

pub use config::{BodyEncoding, OauthProviderConfig};
pub use engine::OauthEngine;
