//! EVM implementation of the gateway over `ethers` HTTP providers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::{
    contract::{ContractCall, ContractError},
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, Bytes, TxHash, U256},
};
use tracing::{debug, info};

use crate::{
    Chain, ChainConfig, ChainError, ChainGateway, Direction, RegistrationRecord,
    RegistrationVariant, TokenInfo, TokenMeta, TokenMetadata, Wallet,
};

use self::bindings::{Backing, Erc20, Erc20Bytes32, Mapping};

mod bindings {
    use ethers::contract::abigen;

    abigen!(
        Backing,
        r#"[
            function assetLength() external view returns (uint256)
            function allAssets(uint256 index) external view returns (address)
            function assets(address token) external view returns (address target, uint256 timestamp)
            function registerToken(address token) external
            function registerTokenBytes32(address token) external
            function crossSendToken(address token, address recipient, uint256 amount) external
            function crossChainSync(bytes proof) external
        ]"#,
    );

    abigen!(
        Mapping,
        r#"[
            function tokenLength() external view returns (uint256)
            function allTokens(uint256 index) external view returns (address)
            function tokenToInfo(address token) external view returns (address source, address backing)
            function crossTransfer(address token, address recipient, uint256 amount) external
        ]"#,
    );

    abigen!(
        Erc20,
        r#"[
            function name() external view returns (string)
            function symbol() external view returns (string)
            function decimals() external view returns (uint8)
            function balanceOf(address account) external view returns (uint256)
        ]"#,
    );

    abigen!(
        Erc20Bytes32,
        r#"[
            function name() external view returns (bytes32)
            function symbol() external view returns (bytes32)
        ]"#,
    );
}

/// Signing client used for both chains
pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

fn connect_provider(config: &ChainConfig) -> Result<Provider<Http>, ChainError> {
    Provider::<Http>::try_from(config.rpc_url.as_str())
        .map_err(|e| ChainError::Config(format!("invalid rpc url {}: {}", config.rpc_url, e)))
}

fn contract_error<M: Middleware>(err: ContractError<M>) -> ChainError {
    ChainError::Contract(err.to_string())
}

fn to_u64(value: U256) -> Result<u64, ChainError> {
    if value > U256::from(u64::MAX) {
        return Err(ChainError::Contract(format!("value {} does not fit in u64", value)));
    }
    Ok(value.as_u64())
}

/// Decode a NUL-padded `bytes32` string
pub fn bytes32_to_string(raw: [u8; 32]) -> String {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Gateway talking to the backing and mapping contracts
pub struct EvmGateway {
    source: Arc<SignerClient>,
    destination: Arc<SignerClient>,
    backing: Backing<SignerClient>,
    mapping: Mapping<SignerClient>,
}

impl EvmGateway {
    pub fn connect(
        source: &ChainConfig,
        destination: &ChainConfig,
        wallet: LocalWallet,
    ) -> Result<Self, ChainError> {
        let source_client = Arc::new(SignerMiddleware::new(
            connect_provider(source)?,
            wallet.clone().with_chain_id(source.chain_id),
        ));
        let destination_client = Arc::new(SignerMiddleware::new(
            connect_provider(destination)?,
            wallet.with_chain_id(destination.chain_id),
        ));

        Ok(Self {
            backing: Backing::new(source.contract, source_client.clone()),
            mapping: Mapping::new(destination.contract, destination_client.clone()),
            source: source_client,
            destination: destination_client,
        })
    }

    fn client(&self, chain: Chain) -> Arc<SignerClient> {
        match chain {
            Chain::Source => self.source.clone(),
            Chain::Destination => self.destination.clone(),
        }
    }

    fn registration_call(
        &self,
        token: Address,
        variant: RegistrationVariant,
    ) -> Result<ContractCall<SignerClient, ()>, ChainError> {
        self.backing
            .method::<_, ()>(variant.entry_point(), token)
            .map_err(|e| ChainError::Contract(e.to_string()))
    }

    fn cross_transfer_call(
        &self,
        direction: Direction,
        token: Address,
        recipient: Address,
        amount: U256,
    ) -> ContractCall<SignerClient, ()> {
        match direction {
            Direction::SourceToDestination => self.backing.cross_send_token(token, recipient, amount),
            Direction::DestinationToSource => self.mapping.cross_transfer(token, recipient, amount),
        }
    }
}

#[async_trait]
impl ChainGateway for EvmGateway {
    async fn token_count(&self, chain: Chain) -> Result<u64, ChainError> {
        let count = match chain {
            Chain::Source => self.backing.asset_length().call().await,
            Chain::Destination => self.mapping.token_length().call().await,
        }
        .map_err(contract_error)?;
        to_u64(count)
    }

    async fn token_at(&self, chain: Chain, index: u64) -> Result<Address, ChainError> {
        match chain {
            Chain::Source => self.backing.all_assets(index.into()).call().await,
            Chain::Destination => self.mapping.all_tokens(index.into()).call().await,
        }
        .map_err(contract_error)
    }

    async fn token_info(&self, dvm_address: Address) -> Result<TokenInfo, ChainError> {
        let (source, backing) = self
            .mapping
            .token_to_info(dvm_address)
            .call()
            .await
            .map_err(contract_error)?;
        Ok(TokenInfo { source, backing })
    }

    async fn registration_record(&self, token: Address) -> Result<RegistrationRecord, ChainError> {
        let (target, timestamp) = self
            .backing
            .assets(token)
            .call()
            .await
            .map_err(contract_error)?;
        Ok(RegistrationRecord::new(target, timestamp))
    }

    async fn string_symbol(&self, token: Address) -> Result<String, ChainError> {
        Erc20::new(token, self.source.clone())
            .symbol()
            .call()
            .await
            .map_err(contract_error)
    }

    async fn balance_of(
        &self,
        chain: Chain,
        token: Address,
        account: Address,
    ) -> Result<U256, ChainError> {
        Erc20::new(token, self.client(chain))
            .balance_of(account)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn submit_registration(
        &self,
        token: Address,
        variant: RegistrationVariant,
    ) -> Result<TxHash, ChainError> {
        let call = self.registration_call(token, variant)?;
        let pending = call.send().await.map_err(contract_error)?;
        let tx_hash = pending.tx_hash();

        info!(?token, ?tx_hash, entry_point = variant.entry_point(), "registration submitted");
        Ok(tx_hash)
    }

    async fn submit_cross_transfer(
        &self,
        direction: Direction,
        token: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        let call = self.cross_transfer_call(direction, token, recipient, amount);
        let pending = call.send().await.map_err(contract_error)?;
        let tx_hash = pending.tx_hash();

        info!(
            chain = %direction.origin(),
            ?token,
            ?recipient,
            %amount,
            ?tx_hash,
            "cross transfer submitted"
        );
        Ok(tx_hash)
    }

    async fn submit_cross_chain_sync(&self, proof: Bytes) -> Result<TxHash, ChainError> {
        let call = self.backing.cross_chain_sync(proof);
        let pending = call.send().await.map_err(contract_error)?;
        let tx_hash = pending.tx_hash();

        info!(?tx_hash, "cross chain sync submitted");
        Ok(tx_hash)
    }
}

/// ERC-20 reader with bytes32 fallback and a configured logo table
pub struct Erc20Metadata {
    source: Arc<Provider<Http>>,
    destination: Arc<Provider<Http>>,
    logos: HashMap<Address, String>,
}

impl Erc20Metadata {
    pub fn connect(
        source: &ChainConfig,
        destination: &ChainConfig,
        logos: HashMap<Address, String>,
    ) -> Result<Self, ChainError> {
        Ok(Self {
            source: Arc::new(connect_provider(source)?),
            destination: Arc::new(connect_provider(destination)?),
            logos,
        })
    }

    fn client(&self, chain: Chain) -> Arc<Provider<Http>> {
        match chain {
            Chain::Source => self.source.clone(),
            Chain::Destination => self.destination.clone(),
        }
    }
}

#[async_trait]
impl TokenMetadata for Erc20Metadata {
    async fn metadata(&self, chain: Chain, token: Address) -> Result<TokenMeta, ChainError> {
        let client = self.client(chain);
        let erc20 = Erc20::new(token, client.clone());

        let name_call = erc20.name();
        let symbol_call = erc20.symbol();
        let decimals_call = erc20.decimals();
        let (name, symbol, decimals) =
            tokio::join!(name_call.call(), symbol_call.call(), decimals_call.call());
        let decimals = decimals.map_err(contract_error)?;

        let legacy = Erc20Bytes32::new(token, client);
        let name = match name {
            Ok(name) => name,
            Err(e) => {
                debug!(?token, error = %e, "string name unavailable, decoding bytes32");
                bytes32_to_string(legacy.name().call().await.map_err(contract_error)?)
            }
        };
        let symbol = match symbol {
            Ok(symbol) => symbol,
            Err(e) => {
                debug!(?token, error = %e, "string symbol unavailable, decoding bytes32");
                bytes32_to_string(legacy.symbol().call().await.map_err(contract_error)?)
            }
        };

        Ok(TokenMeta {
            name,
            symbol,
            decimals,
            logo: self.logos.get(&token).cloned(),
        })
    }

    async fn bytes32_symbol(&self, token: Address) -> Result<String, ChainError> {
        let raw = Erc20Bytes32::new(token, self.source.clone())
            .symbol()
            .call()
            .await
            .map_err(contract_error)?;
        Ok(bytes32_to_string(raw))
    }
}

/// Local key wallet connected to one RPC endpoint
pub struct EvmWallet {
    signer: LocalWallet,
    provider: Provider<Http>,
}

impl EvmWallet {
    pub fn connect(signer: LocalWallet, rpc_url: &str) -> Result<Self, ChainError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| ChainError::Config(format!("invalid rpc url {}: {}", rpc_url, e)))?;
        Ok(Self { signer, provider })
    }
}

#[async_trait]
impl Wallet for EvmWallet {
    fn account(&self) -> Option<Address> {
        Some(self.signer.address())
    }

    async fn network_id(&self) -> Result<u64, ChainError> {
        let id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        to_u64(id)
    }
}
