use anyhow::Result;
use chrono::NaiveDateTime;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::domain::{BuyPrice, Repair};

/// Service settings: where to listen, how to reach the meter, where the
/// user-owned configuration document lives.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub meter: MeterHttpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MeterHttpConfig {
    pub http_timeout_seconds: u64,
    /// Upper bound for one readingcheck history walk.
    pub scan_timeout_seconds: u64,
}

impl Default for MeterHttpConfig {
    fn default() -> Self {
        Self {
            http_timeout_seconds: 10,
            scan_timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub config_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from("config/config.json"),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("MB__").split("__"));
        Ok(figment.extract()?)
    }
}

/// The user-owned configuration document: meter endpoint, installation date,
/// price schedule and the accumulated repair. Editable over the API and
/// persisted as JSON by `repo::config_file`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterConfig {
    pub wallbox_host: String,
    pub wallbox_version: u32,
    #[serde(default)]
    pub installation_date: Option<NaiveDateTime>,
    pub sell_price: f64,
    #[serde(default)]
    pub buy_prices: Vec<BuyPrice>,
    #[serde(default)]
    pub repair: Repair,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            wallbox_host: "openwb".to_string(),
            wallbox_version: 2,
            installation_date: None,
            sell_price: 0.0,
            buy_prices: Vec::new(),
            repair: Repair::default(),
        }
    }
}
