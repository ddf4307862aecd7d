use core::fmt::{Debug, Display};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

pub const CONFIG_FILE: &str = "raffle-board.toml";

pub const ENV_PREFIX: &str = "RAFFLE_BOARD_";

const MINUTES_PER_DAY: i32 = 24 * 60;

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OpenIdConnectConfig {
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Where raffles are kept.
#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    Postgres {
        database_url: String,
    },
    /// Everything is lost on restart.
    #[default]
    Memory,
}

const fn default_timeout_secs() -> u64 {
    30
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ContentGenerationConfig {
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_listen() -> SocketAddr {
    SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::UNSPECIFIED), 3000)
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Public base url, used for the openid connect redirect.
    pub url: String,
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default)]
    pub storage: StorageConfig,
    pub openidconnect: Option<OpenIdConnectConfig>,
    /// Bearer token to user id pairs accepted when no openid connect provider
    /// is configured.
    #[serde(default)]
    pub dev_tokens: HashMap<String, String>,
    pub content_generation: Option<ContentGenerationConfig>,
    /// Offset from UTC that decides which calendar day it is for
    /// finalization dates.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

#[derive(thiserror::Error)]
pub enum ConfigError {
    #[error("config error: {0}")]
    Figment(#[from] figment::Error),
    #[error("config error: utc_offset_minutes must be within a day, got {0}")]
    UtcOffset(i32),
}

impl Debug for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

#[must_use]
pub fn figment() -> Figment {
    Figment::new()
        .merge(Toml::file(CONFIG_FILE))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

impl Config {
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        if config.utc_offset_minutes.abs() >= MINUTES_PER_DAY {
            return Err(ConfigError::UtcOffset(config.utc_offset_minutes));
        }
        Ok(config)
    }
}

pub fn get_config() -> Result<Config, ConfigError> {
    Config::from_figment(&figment())
}
