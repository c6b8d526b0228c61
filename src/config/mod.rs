mod basic;

pub use basic::BasicConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "config.toml";
const ACCOUNT_STORE_DIR: &str = ".kiro-proxy";
const ACCOUNT_STORE_FILE: &str = "config.json";

/// Application configuration: defaults, merged with an optional `config.toml`, merged with
/// `KIRO_`-prefixed environment variables. The CLI's single positional `port` argument, when
/// given, overrides `basic.listen_port` after all of the above (see [`Config::resolve_port`]).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub basic: BasicConfig,
}

impl Config {
    pub fn figment() -> Figment {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Env::prefixed("KIRO_").split("_"));
        if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment.merge(Toml::file(DEFAULT_CONFIG_FILE))
        } else {
            figment
        }
    }

    pub fn load() -> Self {
        Self::figment().extract().unwrap_or_else(|err| {
            panic!("failed to extract configuration (defaults + optional config.toml): {err}")
        })
    }

    /// CLI `port`, if given, wins over the config-derived default.
    pub fn resolve_port(&self, cli_port: Option<u16>) -> u16 {
        cli_port.unwrap_or(self.basic.listen_port)
    }

    /// `~/.kiro-proxy/config.json` unless overridden.
    pub fn account_store_path(&self) -> PathBuf {
        if let Some(path) = &self.basic.account_store_path {
            return PathBuf::from(path);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(ACCOUNT_STORE_DIR)
            .join(ACCOUNT_STORE_FILE)
    }
}
