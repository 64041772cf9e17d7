//! Bridge Configuration
//!
//! TOML file naming both chain endpoints, the indexer and the proof RPC.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use ethers::types::{Address, H256};
use issuing_chain::ChainConfig;
use serde::{Deserialize, Serialize};

use crate::coordinator::parse_address;
use crate::error::ConfigError;
use crate::monitor::{RetryPolicy, DEFAULT_POLL_INTERVAL};
use crate::proof::DEFAULT_LEAF_KEY;

pub const DEFAULT_BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub source: ChainConfig,
    pub destination: ChainConfig,
    pub indexer: IndexerConfig,
    pub proof: ProofConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
    /// Logo URLs keyed by source-chain token address
    #[serde(default)]
    pub logos: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofConfig {
    pub rpc_url: String,
    #[serde(default = "default_leaf_key")]
    pub leaf_key: H256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Unset means poll until the indexer reports the registration
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: None,
        }
    }
}

impl From<&MonitorConfig> for RetryPolicy {
    fn from(config: &MonitorConfig) -> Self {
        RetryPolicy {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_attempts: config.max_attempts,
        }
    }
}

fn default_bus_capacity() -> usize {
    DEFAULT_BUS_CAPACITY
}

fn default_leaf_key() -> H256 {
    DEFAULT_LEAF_KEY
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

impl BridgeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.monitor)
    }

    pub fn logo_table(&self) -> Result<HashMap<Address, String>, ConfigError> {
        self.logos
            .iter()
            .map(|(address, logo)| {
                parse_address(address)
                    .map(|address| (address, logo.clone()))
                    .ok_or_else(|| ConfigError::Logo(address.clone()))
            })
            .collect()
    }
}
