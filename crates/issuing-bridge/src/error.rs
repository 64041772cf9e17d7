use std::path::PathBuf;

use ethers::types::Address;
use issuing_chain::ChainError;
use thiserror::Error;

/// Errors surfaced to callers of the coordinator and catalog
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("wallet is connected to network {actual}, expected {expected}")]
    NetworkMismatch { expected: u64, actual: u64 },

    #[error("registration of {0:?} is already being monitored")]
    InFlight(Address),

    #[error("no wallet available")]
    NoWallet,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    Indexer(#[from] IndexerError),

    #[error(transparent)]
    Proof(#[from] ProofError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Terminal failures of a proof pipeline
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("proof fetch failed: {0}")]
    ProofFetch(#[from] ProofError),

    #[error("indexer did not report {token:?} after {attempts} attempts")]
    RetriesExhausted { token: Address, attempts: u32 },

    #[error("already monitoring {0:?}")]
    AlreadyWatching(Address),

    #[error("monitoring cancelled")]
    Cancelled,

    #[error("monitor task panicked")]
    Panicked,
}

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("indexer returned status {0}")]
    Status(u16),

    #[error("malformed indexer response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid indexer url: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum ProofError {
    #[error("proof RPC error: {0}")]
    Rpc(String),

    #[error("invalid proof endpoint: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid logo entry: {0}")]
    Logo(String),
}
