use serde::{Deserialize, Serialize};
use url::Url;

/// Global provider defaults, used when a provider-level setting is unset.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderDefaults {
    /// Optional upstream HTTP proxy for adapter reqwest clients.
    #[serde(default)]
    pub proxy: Option<Url>,

    /// Allow HTTP/2 multiplexing; disabled forces HTTP/1.1.
    #[serde(default = "default_enable_multiplexing")]
    pub enable_multiplexing: bool,
}

impl Default for ProviderDefaults {
    fn default() -> Self {
        Self {
            proxy: None,
            enable_multiplexing: default_enable_multiplexing(),
        }
    }
}

/// Per-provider enable flag and proxy override.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub proxy: Option<Url>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            proxy: None,
        }
    }
}

impl ProviderConfig {
    pub fn resolved_proxy<'a>(&'a self, defaults: &'a ProviderDefaults) -> Option<&'a Url> {
        self.proxy.as_ref().or(defaults.proxy.as_ref())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub defaults: ProviderDefaults,
    #[serde(default)]
    pub anthropic: ProviderConfig,
    #[serde(default)]
    pub codex: ProviderConfig,
    #[serde(default)]
    pub gemini: ProviderConfig,
    #[serde(default)]
    pub antigravity: ProviderConfig,
}

fn default_enable_multiplexing() -> bool {
    true
}

fn default_true() -> bool {
    true
}
