//! Registration Coordinator
//!
//! Derives registration status from the backing contract, submits
//! registrations with the entry point matching the token's symbol encoding,
//! and hands registrations over to the [`ProofMonitor`].

use std::sync::Arc;

use ethers::abi::{self, Token as AbiToken};
use ethers::types::{Address, Bytes, TxHash, U256};
use issuing_chain::{ChainGateway, RegistrationVariant, TokenMetadata, Wallet};
use issuing_types::{Direction, MembershipProof, ProofEvent, RegistrationStatus};
use tracing::{debug, info, warn};

use crate::error::{BridgeError, MonitorError};
use crate::monitor::{ProofMonitor, ProofSubscription};

/// How a token's `symbol()` is ABI-encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolEncoding {
    String(String),
    Bytes32(String),
}

impl SymbolEncoding {
    pub fn symbol(&self) -> &str {
        match self {
            SymbolEncoding::String(symbol) | SymbolEncoding::Bytes32(symbol) => symbol,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, SymbolEncoding::String(_))
    }

    pub fn variant(&self) -> RegistrationVariant {
        match self {
            SymbolEncoding::String(_) => RegistrationVariant::String,
            SymbolEncoding::Bytes32(_) => RegistrationVariant::Bytes32,
        }
    }
}

/// Parse a `0x`-prefixed hex address, case-insensitively
pub fn parse_address(raw: &str) -> Option<Address> {
    let raw = raw.trim();
    let hex = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))?;
    if hex.len() != 40 {
        return None;
    }
    hex.parse().ok()
}

/// ABI encoding of a membership proof as `(bytes32 at, bytes[] proof)`
pub fn encode_proof(proof: &MembershipProof) -> Bytes {
    let nodes = proof
        .proof
        .iter()
        .map(|node| AbiToken::Bytes(node.to_vec()))
        .collect();
    abi::encode(&[
        AbiToken::FixedBytes(proof.at.as_bytes().to_vec()),
        AbiToken::Array(nodes),
    ])
    .into()
}

pub struct RegistrationCoordinator {
    gateway: Arc<dyn ChainGateway>,
    metadata: Arc<dyn TokenMetadata>,
    wallet: Option<Arc<dyn Wallet>>,
    monitor: ProofMonitor,
    destination_network: u64,
}

impl RegistrationCoordinator {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        metadata: Arc<dyn TokenMetadata>,
        wallet: Option<Arc<dyn Wallet>>,
        monitor: ProofMonitor,
        destination_network: u64,
    ) -> Self {
        Self {
            gateway,
            metadata,
            wallet,
            monitor,
            destination_network,
        }
    }

    pub fn monitor(&self) -> &ProofMonitor {
        &self.monitor
    }

    fn wallet(&self) -> Result<&Arc<dyn Wallet>, BridgeError> {
        self.wallet.as_ref().ok_or(BridgeError::NoWallet)
    }

    /// Registration status of `address`, `None` if it is not a valid address
    pub async fn status(&self, address: &str) -> Result<Option<RegistrationStatus>, BridgeError> {
        let Some(token) = parse_address(address) else {
            warn!(address, "invalid token address");
            return Ok(None);
        };
        Ok(Some(self.token_status(token).await?))
    }

    /// `true` unless the token is known to be unregistered
    pub async fn is_registered(&self, address: &str) -> Result<bool, BridgeError> {
        let status = self.status(address).await?;
        Ok(status != Some(RegistrationStatus::Unregistered))
    }

    async fn token_status(&self, token: Address) -> Result<RegistrationStatus, BridgeError> {
        let record = self.gateway.registration_record(token).await?;
        Ok(record.status())
    }

    /// Probe whether `symbol()` returns a string, falling back to the bytes32 resolver
    pub async fn symbol_type(&self, token: Address) -> Result<SymbolEncoding, BridgeError> {
        match self.gateway.string_symbol(token).await {
            Ok(symbol) => Ok(SymbolEncoding::String(symbol)),
            Err(e) => {
                debug!(?token, error = %e, "string symbol read failed, resolving bytes32");
                let symbol = self.metadata.bytes32_symbol(token).await?;
                Ok(SymbolEncoding::Bytes32(symbol))
            }
        }
    }

    /// Register `address` on the backing contract and start monitoring for its proof
    ///
    /// Returns `None` when the token needs no registration. The token's
    /// pipeline slot is claimed before anything is submitted, so concurrent
    /// calls for one token submit at most one transaction.
    pub async fn register(&self, address: &str) -> Result<Option<ProofSubscription>, BridgeError> {
        if self.is_registered(address).await? {
            debug!(address, "token needs no registration");
            return Ok(None);
        }
        let token = parse_address(address)
            .ok_or_else(|| BridgeError::InvalidAddress(address.to_string()))?;

        let reservation = match self.monitor.reserve(token) {
            Ok(reservation) => reservation,
            Err(MonitorError::AlreadyWatching(token)) => return Err(BridgeError::InFlight(token)),
            Err(e) => return Err(e.into()),
        };
        let account = self.wallet()?.account().ok_or(BridgeError::NoWallet)?;

        let encoding = self.symbol_type(token).await?;
        let tx_hash = self
            .gateway
            .submit_registration(token, encoding.variant())
            .await?;
        info!(
            ?token,
            ?account,
            symbol = encoding.symbol(),
            ?tx_hash,
            "token registration submitted"
        );

        Ok(Some(reservation.start()))
    }

    /// Send `amount` of `token` across the bridge
    ///
    /// Transfers back to the source chain require the wallet to be on the
    /// destination network.
    pub async fn cross_send(
        &self,
        direction: Direction,
        token: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<TxHash, BridgeError> {
        if direction == Direction::DestinationToSource {
            let actual = self.wallet()?.network_id().await?;
            if actual != self.destination_network {
                return Err(BridgeError::NetworkMismatch {
                    expected: self.destination_network,
                    actual,
                });
            }
        }

        Ok(self
            .gateway
            .submit_cross_transfer(direction, token, recipient, amount)
            .await?)
    }

    /// Submit an acquired proof to the backing contract
    pub async fn confirm(&self, event: &ProofEvent) -> Result<TxHash, BridgeError> {
        let tx_hash = self
            .gateway
            .submit_cross_chain_sync(encode_proof(&event.proof))
            .await?;
        info!(token = ?event.token, ?tx_hash, "registration proof submitted");
        Ok(tx_hash)
    }
}
