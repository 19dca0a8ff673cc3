mod basic;
mod providers;

pub use basic::BasicConfig;
pub use providers::{ProviderConfig, ProviderDefaults, ProvidersConfig};

use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration managed by Figment: defaults, layered with an optional
/// `config.toml`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub basic: BasicConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

const DEFAULT_CONFIG_FILE: &str = "config.toml";

impl Config {
    fn figment() -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment.merge(Toml::file(DEFAULT_CONFIG_FILE))
        } else {
            figment
        }
    }

    /// Load configuration by merging defaults and `config.toml`, if present.
    pub fn load() -> Self {
        Self::figment().extract().unwrap_or_else(|err| {
            panic!("failed to extract configuration (defaults + optional config.toml): {err}")
        })
    }
}
