//! Root application configuration.
//!
//! Loaded from `config.yaml` at startup. Groups chain-RPC, persistence, and
//! pricing/whitelist settings the core components consume.

use config::{Config, ConfigError, File};
use serde::Deserialize;

/// Chain-reader and HyperSync connection settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ChainSettings {
    pub rpc_url: String,
    pub hypersync_url: String,
    pub hypersync_bearer_token: String,
    /// The pool manager contract address (lowercase hex, 0x-prefixed).
    pub pool_manager_address: String,
    /// Inclusive lower bound for the first-ever sync.
    pub starting_block: u64,
    #[serde(default = "default_sync_batch_size")]
    pub sync_batch_size: u64,
    #[serde(default = "default_tip_poll_interval")]
    pub tip_poll_interval_milliseconds: u64,
}

fn default_sync_batch_size() -> u64 {
    1000
}

fn default_tip_poll_interval() -> u64 {
    200
}

/// PostgreSQL connection configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// Price Oracle and whitelist configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct PricingSettings {
    pub wrapped_native_address: String,
    pub stablecoin_wrapped_native_pool_id: String,
    pub stablecoin_is_token0: bool,
    pub stablecoin_addresses: Vec<String>,
    pub whitelist_tokens: Vec<String>,
    #[serde(default = "default_minimum_native_locked")]
    pub minimum_native_locked: String,
}

fn default_minimum_native_locked() -> String {
    "10".to_string()
}

/// Event Bus settings.
#[derive(Debug, Deserialize, Clone)]
pub struct BusSettings {
    #[serde(default = "default_subscriber_buffer_size")]
    pub subscriber_buffer_size: usize,
}

fn default_subscriber_buffer_size() -> usize {
    1024
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            subscriber_buffer_size: default_subscriber_buffer_size(),
        }
    }
}

/// Root application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub chain: ChainSettings,
    pub postgres: PostgresSettings,
    pub pricing: PricingSettings,
    #[serde(default)]
    pub bus: BusSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .build()?;

        s.try_deserialize()
    }
}
