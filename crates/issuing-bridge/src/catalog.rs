//! Token Catalog
//!
//! Lists every token known to the backing or mapping contract, decorated with
//! metadata and the account's balance.

use std::sync::Arc;

use ethers::types::{Address, U256};
use futures::future::try_join_all;
use issuing_chain::{ChainError, ChainGateway, TokenMetadata};
use issuing_types::{Chain, Token};
use tracing::debug;

pub struct TokenCatalog {
    gateway: Arc<dyn ChainGateway>,
    metadata: Arc<dyn TokenMetadata>,
}

impl TokenCatalog {
    pub fn new(gateway: Arc<dyn ChainGateway>, metadata: Arc<dyn TokenMetadata>) -> Self {
        Self { gateway, metadata }
    }

    /// All tokens on `chain`, in contract enumeration order
    ///
    /// Destination tokens carry the metadata of their source token. Balances
    /// are zero when no account is given.
    pub async fn list_tokens(
        &self,
        chain: Chain,
        account: Option<Address>,
    ) -> Result<Vec<Token>, ChainError> {
        let count = self.gateway.token_count(chain).await?;
        debug!(%chain, count, "listing bridge tokens");

        try_join_all((0..count).map(|index| self.token_at(chain, index, account))).await
    }

    async fn token_at(
        &self,
        chain: Chain,
        index: u64,
        account: Option<Address>,
    ) -> Result<Token, ChainError> {
        let address = self.gateway.token_at(chain, index).await?;
        let origin = match chain {
            Chain::Source => address,
            Chain::Destination => self.gateway.token_info(address).await?.source,
        };

        let balance = async {
            match account {
                Some(account) => self.gateway.balance_of(chain, address, account).await,
                None => Ok(U256::zero()),
            }
        };
        let (meta, balance) =
            tokio::try_join!(self.metadata.metadata(Chain::Source, origin), balance)?;

        Ok(Token::new(address, meta, balance))
    }
}
