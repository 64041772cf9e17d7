//! Issuing Chain Gateway
//!
//! Typed access to the two bridge endpoints: the backing contract on the
//! source chain and the mapping contract on the destination chain.
//! Covers enumeration, registration state reads and transaction submission.

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TxHash, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use issuing_types::{Chain, Direction, RegistrationRecord, TokenMeta};

#[cfg(feature = "evm")]
pub mod evm;

#[cfg(feature = "evm")]
pub use evm::{Erc20Metadata, EvmGateway, EvmWallet};

/// Read and write access to the backing and mapping contracts
///
/// Mutating methods return once the node accepted the transaction; they never
/// wait for confirmations.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Number of tokens known to the contract on `chain`
    async fn token_count(&self, chain: Chain) -> Result<u64, ChainError>;

    /// Token address at `index` of the contract's enumeration on `chain`
    async fn token_at(&self, chain: Chain, index: u64) -> Result<Address, ChainError>;

    /// Origin of a mapped token on the destination chain
    async fn token_info(&self, dvm_address: Address) -> Result<TokenInfo, ChainError>;

    /// Registration record kept by the backing contract
    async fn registration_record(&self, token: Address) -> Result<RegistrationRecord, ChainError>;

    /// Calls `symbol()` expecting an ABI string; fails when the token encodes it otherwise
    async fn string_symbol(&self, token: Address) -> Result<String, ChainError>;

    async fn balance_of(
        &self,
        chain: Chain,
        token: Address,
        account: Address,
    ) -> Result<U256, ChainError>;

    /// Submit `registerToken` or `registerTokenBytes32` on the backing contract
    async fn submit_registration(
        &self,
        token: Address,
        variant: RegistrationVariant,
    ) -> Result<TxHash, ChainError>;

    /// Submit `crossSendToken` (source) or `crossTransfer` (destination)
    async fn submit_cross_transfer(
        &self,
        direction: Direction,
        token: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError>;

    /// Submit `crossChainSync` on the backing contract
    async fn submit_cross_chain_sync(&self, proof: Bytes) -> Result<TxHash, ChainError>;
}

/// The account transactions are signed with
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Active account, `None` while the wallet is locked
    fn account(&self) -> Option<Address>;

    /// Chain id of the network the wallet is connected to
    async fn network_id(&self) -> Result<u64, ChainError>;
}

/// Token metadata lookup
#[async_trait]
pub trait TokenMetadata: Send + Sync {
    async fn metadata(&self, chain: Chain, token: Address) -> Result<TokenMeta, ChainError>;

    /// Symbol of a token whose `symbol()` returns `bytes32`
    async fn bytes32_symbol(&self, token: Address) -> Result<String, ChainError>;
}

/// `tokenToInfo` result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub source: Address,
    pub backing: Address,
}

/// Registration entry point on the backing contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationVariant {
    /// Token's `symbol()` returns `string`
    String,
    /// Token's `symbol()` returns `bytes32`
    Bytes32,
}

impl RegistrationVariant {
    pub fn entry_point(&self) -> &'static str {
        match self {
            RegistrationVariant::String => "registerToken",
            RegistrationVariant::Bytes32 => "registerTokenBytes32",
        }
    }
}

/// Endpoint of one side of the bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Backing contract on the source chain, mapping contract on the destination
    pub contract: Address,
}

/// Error types
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Contract error: {0}")]
    Contract(String),
}
