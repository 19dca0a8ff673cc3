use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

/// Core server configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BasicConfig {
    /// HTTP server listen address. We bind `localhost` only per spec §6.
    /// TOML: `basic.listen_addr`. Default: `127.0.0.1`.
    #[serde(default = "default_listen_ip")]
    pub listen_addr: IpAddr,

    /// HTTP server listen port.
    /// TOML: `basic.listen_port`. Default: `8787`.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// SQLite URL for the credential store.
    /// TOML: `basic.database_url`. Default: `sqlite://amprelay.db`.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Directory the credential store database lives under; created with mode 0o700.
    /// TOML: `basic.data_dir`.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Log level for the tracing subscriber (e.g. "error", "warn", "info", "debug", "trace").
    /// TOML: `basic.loglevel`. Default: `info`.
    #[serde(default = "default_loglevel")]
    pub loglevel: String,

    /// Base URL of the client's paid upstream gateway, used for fallback forwarding.
    /// TOML: `basic.upstream_base`.
    #[serde(default)]
    pub upstream_base: String,

    /// Bearer key for the upstream fallback `Authorization` header, if known.
    /// TOML: `basic.amp_key`.
    #[serde(default)]
    pub amp_key: Option<String>,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_ip(),
            listen_port: default_listen_port(),
            database_url: default_database_url(),
            data_dir: default_data_dir(),
            loglevel: default_loglevel(),
            upstream_base: String::new(),
            amp_key: None,
        }
    }
}

fn default_listen_ip() -> IpAddr {
    Ipv4Addr::new(127, 0, 0, 1).into()
}

fn default_listen_port() -> u16 {
    8787
}

fn default_database_url() -> String {
    "sqlite://amprelay.db".to_string()
}

fn default_data_dir() -> String {
    ".amprelay".to_string()
}

fn default_loglevel() -> String {
    "info".to_string()
}
