use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

/// Core (ambient) configuration layer, managed by Figment.
///
/// Everything here is an operator knob outside the client-facing contract fixed by the spec
/// (listen port comes from the CLI, not this struct — see [`super::Config::resolve_port`]).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BasicConfig {
    /// TOML: `basic.listen_addr`. Default: `0.0.0.0`.
    #[serde(default = "default_listen_ip")]
    pub listen_addr: IpAddr,

    /// TOML: `basic.listen_port`. Default: `8080`. Overridden by the CLI `port` argument when
    /// one is given.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// TOML: `basic.loglevel`. Default: `info`.
    #[serde(default = "default_loglevel")]
    pub loglevel: String,

    /// Base URL of the upstream Kiro service. TOML: `basic.upstream_base_url`.
    #[serde(default = "default_upstream_base_url")]
    pub upstream_base_url: String,

    /// Path to the persisted account snapshot. TOML: `basic.account_store_path`.
    /// Default: `~/.kiro-proxy/config.json`, resolved at load time.
    #[serde(default)]
    pub account_store_path: Option<String>,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_ip(),
            listen_port: default_listen_port(),
            loglevel: default_loglevel(),
            upstream_base_url: default_upstream_base_url(),
            account_store_path: None,
        }
    }
}

fn default_listen_ip() -> IpAddr {
    Ipv4Addr::new(0, 0, 0, 0).into()
}

fn default_listen_port() -> u16 {
    8080
}

fn default_loglevel() -> String {
    "info".to_string()
}

fn default_upstream_base_url() -> String {
    "https://codewhisperer.us-east-1.amazonaws.com".to_string()
}
