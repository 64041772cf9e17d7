//! Issuing Bridge Manager
//!
//! Wires the gateway, catalog, coordinator, monitor and bus together. The
//! chain clients and the bus are created once here and shared by reference.

use std::sync::Arc;

use ethers::signers::LocalWallet;
use ethers::types::H256;
use issuing_chain::{ChainGateway, Erc20Metadata, EvmGateway, EvmWallet, TokenMetadata, Wallet};
use issuing_types::{Chain, Token};
use tracing::info;

use crate::bus::{ProofBus, ProofStream};
use crate::catalog::TokenCatalog;
use crate::config::BridgeConfig;
use crate::coordinator::RegistrationCoordinator;
use crate::error::BridgeError;
use crate::indexer::{HttpIndexer, IndexerClient};
use crate::monitor::{ProofMonitor, RetryPolicy};
use crate::proof::{ProofProvider, RpcProofProvider};

/// Collaborators the bridge is assembled from
pub struct BridgeParts {
    pub gateway: Arc<dyn ChainGateway>,
    pub metadata: Arc<dyn TokenMetadata>,
    pub wallet: Option<Arc<dyn Wallet>>,
    pub indexer: Arc<dyn IndexerClient>,
    pub prover: Arc<dyn ProofProvider>,
}

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub destination_network: u64,
    pub leaf_key: H256,
    pub retry_policy: RetryPolicy,
    pub bus_capacity: usize,
}

impl From<&BridgeConfig> for BridgeSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            destination_network: config.destination.chain_id,
            leaf_key: config.proof.leaf_key,
            retry_policy: config.retry_policy(),
            bus_capacity: config.bus_capacity,
        }
    }
}

pub struct IssuingBridge {
    coordinator: RegistrationCoordinator,
    catalog: TokenCatalog,
    wallet: Option<Arc<dyn Wallet>>,
}

impl IssuingBridge {
    pub fn new(parts: BridgeParts, settings: BridgeSettings) -> Self {
        let bus = ProofBus::new(settings.bus_capacity);
        let monitor = ProofMonitor::new(
            parts.indexer,
            parts.prover,
            bus,
            settings.retry_policy,
            settings.leaf_key,
        );

        Self {
            coordinator: RegistrationCoordinator::new(
                parts.gateway.clone(),
                parts.metadata.clone(),
                parts.wallet.clone(),
                monitor,
                settings.destination_network,
            ),
            catalog: TokenCatalog::new(parts.gateway, parts.metadata),
            wallet: parts.wallet,
        }
    }

    /// Connect to the endpoints in `config`, signing with `signer`
    ///
    /// The wallet reports the network of `wallet_rpc`, defaulting to the
    /// destination chain endpoint.
    pub fn connect(
        config: &BridgeConfig,
        signer: LocalWallet,
        wallet_rpc: Option<&str>,
    ) -> Result<Self, BridgeError> {
        let logos = config.logo_table()?;
        let wallet_rpc = wallet_rpc.unwrap_or(&config.destination.rpc_url);

        let parts = BridgeParts {
            gateway: Arc::new(EvmGateway::connect(
                &config.source,
                &config.destination,
                signer.clone(),
            )?),
            metadata: Arc::new(Erc20Metadata::connect(
                &config.source,
                &config.destination,
                logos,
            )?),
            wallet: Some(Arc::new(EvmWallet::connect(signer, wallet_rpc)?)),
            indexer: Arc::new(HttpIndexer::new(&config.indexer.base_url)?),
            prover: Arc::new(RpcProofProvider::connect(&config.proof.rpc_url)?),
        };

        info!(
            source = %config.source.rpc_url,
            destination = %config.destination.rpc_url,
            indexer = %config.indexer.base_url,
            "bridge clients initialized"
        );
        Ok(Self::new(parts, BridgeSettings::from(config)))
    }

    pub fn coordinator(&self) -> &RegistrationCoordinator {
        &self.coordinator
    }

    pub fn catalog(&self) -> &TokenCatalog {
        &self.catalog
    }

    pub fn monitor(&self) -> &ProofMonitor {
        self.coordinator.monitor()
    }

    /// Subscribe to every proof delivered from now on
    pub fn subscribe(&self) -> ProofStream {
        self.monitor().bus().subscribe()
    }

    /// Tokens on `chain` with the wallet account's balances
    ///
    /// Empty when no wallet is available.
    pub async fn tokens(&self, chain: Chain) -> Result<Vec<Token>, BridgeError> {
        let Some(wallet) = &self.wallet else {
            return Ok(Vec::new());
        };
        Ok(self.catalog.list_tokens(chain, wallet.account()).await?)
    }
}
