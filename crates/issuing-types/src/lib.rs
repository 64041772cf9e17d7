//! Issuing Bridge Types
//!
//! Data structures shared by the chain gateway and the registration pipeline:
//! tokens, on-chain registration records, indexer records and proof events.

use std::fmt;
use std::str::FromStr;

use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

/// Which side of the bridge a read or write goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Chain holding the backing contract
    Source,
    /// Chain holding the mapping contract
    Destination,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chain::Source => f.write_str("source"),
            Chain::Destination => f.write_str("destination"),
        }
    }
}

impl FromStr for Chain {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "source" | "backing" => Ok(Chain::Source),
            "destination" | "mapping" => Ok(Chain::Destination),
            _ => Err(ParseError::Chain(s.to_string())),
        }
    }
}

/// Direction of a cross-chain transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    SourceToDestination,
    DestinationToSource,
}

impl Direction {
    /// Chain the transfer transaction is submitted on
    pub fn origin(&self) -> Chain {
        match self {
            Direction::SourceToDestination => Chain::Source,
            Direction::DestinationToSource => Chain::Destination,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::SourceToDestination => write!(f, "s2d"),
            Direction::DestinationToSource => write!(f, "d2s"),
        }
    }
}

impl FromStr for Direction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s2d" | "source-to-destination" => Ok(Direction::SourceToDestination),
            "d2s" | "destination-to-source" => Ok(Direction::DestinationToSource),
            _ => Err(ParseError::Direction(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unknown chain: {0}")]
    Chain(String),
    #[error("unknown direction: {0}")]
    Direction(String),
}

/// Token metadata as resolved by a metadata collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMeta {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub logo: Option<String>,
}

/// A bridgeable token as listed on one chain
///
/// Metadata is a snapshot taken when the token was listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub name: String,
    pub logo: Option<String>,
    pub balance: U256,
}

impl Token {
    pub fn new(address: Address, meta: TokenMeta, balance: U256) -> Self {
        Self {
            address,
            symbol: meta.symbol,
            decimals: meta.decimals,
            name: meta.name,
            logo: meta.logo,
            balance,
        }
    }
}

/// Registration state kept by the backing contract for one token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistrationRecord {
    /// Linked token on the destination chain, zero until confirmed
    pub target: Address,
    /// Block timestamp of the registration, zero if never registered
    pub timestamp: U256,
}

impl RegistrationRecord {
    pub fn new(target: Address, timestamp: U256) -> Self {
        Self { target, timestamp }
    }

    pub fn status(&self) -> RegistrationStatus {
        match (self.timestamp.is_zero(), self.target.is_zero()) {
            (true, _) => RegistrationStatus::Unregistered,
            (false, true) => RegistrationStatus::Registering,
            (false, false) => RegistrationStatus::Registered,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Unregistered,
    Registering,
    Registered,
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegistrationStatus::Unregistered => "unregistered",
            RegistrationStatus::Registering => "registering",
            RegistrationStatus::Registered => "registered",
        };
        f.write_str(s)
    }
}

/// Record reported by the indexer once a registration transaction is included
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerRecord {
    #[serde(default)]
    pub extrinsic_index: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub block_num: u64,
    pub block_hash: H256,
    #[serde(default)]
    pub backing: Option<Address>,
    #[serde(default)]
    pub source: Option<Address>,
    #[serde(default)]
    pub target: Option<Address>,
    #[serde(default)]
    pub block_timestamp: Option<u64>,
    #[serde(default)]
    pub mmr_index: Option<u64>,
    #[serde(default)]
    pub mmr_root: Option<String>,
    #[serde(default)]
    pub signatures: Option<String>,
    #[serde(default)]
    pub block_header: Option<serde_json::Value>,
    #[serde(default)]
    pub tx: Option<String>,
}

/// Storage read proof returned by the proof-generation RPC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipProof {
    /// Block the proof was generated against
    pub at: H256,
    /// Trie nodes
    pub proof: Vec<Bytes>,
}

/// Proof delivered once per successful registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofEvent {
    /// Source-chain token the registration was for
    pub token: Address,
    pub block_number: u64,
    pub block_hash: H256,
    pub leaf_key: H256,
    pub proof: MembershipProof,
}
