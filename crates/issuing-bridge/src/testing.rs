//! In-memory collaborators for exercising the bridge without live chains.
//!
//! Every fake records the calls made against it so tests can assert on
//! ordering, counts and timing.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TxHash, H256, U256};
use issuing_chain::{
    ChainError, ChainGateway, RegistrationVariant, TokenInfo, TokenMetadata, Wallet,
};
use issuing_types::{
    Chain, Direction, IndexerRecord, MembershipProof, ProofEvent, RegistrationRecord, TokenMeta,
};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::{IndexerError, ProofError};
use crate::indexer::IndexerClient;
use crate::proof::{ProofProvider, DEFAULT_LEAF_KEY};

pub fn meta(symbol: &str, decimals: u8) -> TokenMeta {
    TokenMeta {
        name: format!("{} Token", symbol),
        symbol: symbol.to_string(),
        decimals,
        logo: None,
    }
}

pub fn proof_event(token: Address) -> ProofEvent {
    ProofEvent {
        token,
        block_number: 1024,
        block_hash: H256::repeat_byte(0x11),
        leaf_key: DEFAULT_LEAF_KEY,
        proof: MembershipProof {
            at: H256::repeat_byte(0x11),
            proof: vec![Bytes::from(vec![0x80, 0x01]), Bytes::from(vec![0x02])],
        },
    }
}

pub fn indexer_record(source: Address, block_hash: H256) -> IndexerRecord {
    IndexerRecord {
        extrinsic_index: Some("1024-1".to_string()),
        account_id: None,
        block_num: 1024,
        block_hash,
        backing: None,
        source: Some(source),
        target: None,
        block_timestamp: None,
        mmr_index: None,
        mmr_root: None,
        signatures: None,
        block_header: None,
        tx: None,
    }
}

#[derive(Default)]
struct GatewayState {
    records: HashMap<Address, RegistrationRecord>,
    string_symbols: HashMap<Address, String>,
    source_tokens: Vec<Address>,
    destination_tokens: Vec<(Address, TokenInfo)>,
    balances: HashMap<(Chain, Address, Address), U256>,
    lookup_delay: Option<Duration>,
    fail_reads: bool,
    calls: Vec<&'static str>,
    registrations: Vec<(Address, RegistrationVariant)>,
    transfers: Vec<(Direction, Address, Address, U256)>,
    syncs: Vec<Bytes>,
    nonce: u64,
}

/// Gateway backed by in-memory contract state
///
/// Registration reads and submissions yield once, so concurrent callers on
/// one task interleave the way they would against a node.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<GatewayState>,
}

impl FakeGateway {
    pub fn set_record(&self, token: Address, record: RegistrationRecord) {
        self.state.lock().records.insert(token, record);
    }

    pub fn set_string_symbol(&self, token: Address, symbol: &str) {
        self.state
            .lock()
            .string_symbols
            .insert(token, symbol.to_string());
    }

    pub fn push_source_token(&self, token: Address) {
        self.state.lock().source_tokens.push(token);
    }

    pub fn push_destination_token(&self, token: Address, info: TokenInfo) {
        self.state.lock().destination_tokens.push((token, info));
    }

    pub fn set_balance(&self, chain: Chain, token: Address, account: Address, balance: U256) {
        self.state
            .lock()
            .balances
            .insert((chain, token, account), balance);
    }

    /// Delay applied to `token_at` and `token_info`
    pub fn set_lookup_delay(&self, delay: Duration) {
        self.state.lock().lookup_delay = Some(delay);
    }

    pub fn fail_reads(&self) {
        self.state.lock().fail_reads = true;
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| **call == method)
            .count()
    }

    pub fn registrations(&self) -> Vec<(Address, RegistrationVariant)> {
        self.state.lock().registrations.clone()
    }

    pub fn transfers(&self) -> Vec<(Direction, Address, Address, U256)> {
        self.state.lock().transfers.clone()
    }

    pub fn syncs(&self) -> Vec<Bytes> {
        self.state.lock().syncs.clone()
    }

    fn read(&self, method: &'static str) -> Result<(), ChainError> {
        let mut state = self.state.lock();
        state.calls.push(method);
        if state.fail_reads {
            return Err(ChainError::Rpc("connection refused".to_string()));
        }
        Ok(())
    }

    async fn lookup_delay(&self) {
        let delay = self.state.lock().lookup_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn next_tx_hash(&self) -> TxHash {
        let mut state = self.state.lock();
        state.nonce += 1;
        H256::from_low_u64_be(state.nonce)
    }
}

#[async_trait]
impl ChainGateway for FakeGateway {
    async fn token_count(&self, chain: Chain) -> Result<u64, ChainError> {
        self.read("token_count")?;
        let state = self.state.lock();
        let count = match chain {
            Chain::Source => state.source_tokens.len(),
            Chain::Destination => state.destination_tokens.len(),
        };
        Ok(count as u64)
    }

    async fn token_at(&self, chain: Chain, index: u64) -> Result<Address, ChainError> {
        self.read("token_at")?;
        self.lookup_delay().await;
        let state = self.state.lock();
        let token = match chain {
            Chain::Source => state.source_tokens.get(index as usize).copied(),
            Chain::Destination => state
                .destination_tokens
                .get(index as usize)
                .map(|(token, _)| *token),
        };
        token.ok_or_else(|| ChainError::Contract(format!("index {} out of range", index)))
    }

    async fn token_info(&self, dvm_address: Address) -> Result<TokenInfo, ChainError> {
        self.read("token_info")?;
        self.lookup_delay().await;
        self.state
            .lock()
            .destination_tokens
            .iter()
            .find(|(token, _)| *token == dvm_address)
            .map(|(_, info)| *info)
            .ok_or_else(|| ChainError::Contract(format!("unknown token {:?}", dvm_address)))
    }

    async fn registration_record(&self, token: Address) -> Result<RegistrationRecord, ChainError> {
        self.read("registration_record")?;
        tokio::task::yield_now().await;
        Ok(self
            .state
            .lock()
            .records
            .get(&token)
            .copied()
            .unwrap_or_default())
    }

    async fn string_symbol(&self, token: Address) -> Result<String, ChainError> {
        self.read("string_symbol")?;
        tokio::task::yield_now().await;
        self.state
            .lock()
            .string_symbols
            .get(&token)
            .cloned()
            .ok_or_else(|| ChainError::Contract("failed to decode string symbol".to_string()))
    }

    async fn balance_of(
        &self,
        chain: Chain,
        token: Address,
        account: Address,
    ) -> Result<U256, ChainError> {
        self.read("balance_of")?;
        Ok(self
            .state
            .lock()
            .balances
            .get(&(chain, token, account))
            .copied()
            .unwrap_or_default())
    }

    async fn submit_registration(
        &self,
        token: Address,
        variant: RegistrationVariant,
    ) -> Result<TxHash, ChainError> {
        tokio::task::yield_now().await;
        self.state.lock().registrations.push((token, variant));
        Ok(self.next_tx_hash())
    }

    async fn submit_cross_transfer(
        &self,
        direction: Direction,
        token: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        self.state
            .lock()
            .transfers
            .push((direction, token, recipient, amount));
        Ok(self.next_tx_hash())
    }

    async fn submit_cross_chain_sync(&self, proof: Bytes) -> Result<TxHash, ChainError> {
        self.state.lock().syncs.push(proof);
        Ok(self.next_tx_hash())
    }
}

/// Metadata lookup over fixed tables
#[derive(Default)]
pub struct FakeMetadata {
    metas: Mutex<HashMap<Address, TokenMeta>>,
    bytes32_symbols: Mutex<HashMap<Address, String>>,
}

impl FakeMetadata {
    pub fn insert(&self, token: Address, meta: TokenMeta) {
        self.metas.lock().insert(token, meta);
    }

    pub fn set_bytes32_symbol(&self, token: Address, symbol: &str) {
        self.bytes32_symbols.lock().insert(token, symbol.to_string());
    }
}

#[async_trait]
impl TokenMetadata for FakeMetadata {
    async fn metadata(&self, _chain: Chain, token: Address) -> Result<TokenMeta, ChainError> {
        self.metas
            .lock()
            .get(&token)
            .cloned()
            .ok_or_else(|| ChainError::Contract(format!("no metadata for {:?}", token)))
    }

    async fn bytes32_symbol(&self, token: Address) -> Result<String, ChainError> {
        self.bytes32_symbols
            .lock()
            .get(&token)
            .cloned()
            .ok_or_else(|| ChainError::Contract(format!("no bytes32 symbol for {:?}", token)))
    }
}

pub struct FakeWallet {
    account: Option<Address>,
    network: u64,
}

impl FakeWallet {
    pub fn new(network: u64) -> Self {
        Self {
            account: Some(Address::repeat_byte(0xaa)),
            network,
        }
    }

    pub fn locked(network: u64) -> Self {
        Self {
            account: None,
            network,
        }
    }
}

#[async_trait]
impl Wallet for FakeWallet {
    fn account(&self) -> Option<Address> {
        self.account
    }

    async fn network_id(&self) -> Result<u64, ChainError> {
        Ok(self.network)
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Absent,
    Fail,
    Indexed(H256),
}

/// Indexer replaying a fixed sequence of answers, then repeating the last one
pub struct ScriptedIndexer {
    script: Mutex<VecDeque<Step>>,
    then: Step,
    calls: Mutex<Vec<Instant>>,
}

impl ScriptedIndexer {
    fn new(script: Vec<Step>, then: Step) -> Self {
        Self {
            script: Mutex::new(script.into()),
            then,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `null` for the first `absent` queries, then the record
    pub fn indexed_after(absent: usize, block_hash: H256) -> Self {
        Self::new(vec![Step::Absent; absent], Step::Indexed(block_hash))
    }

    /// Errors for the first `failures` queries, then the record
    pub fn failing_then_indexed(failures: usize, block_hash: H256) -> Self {
        Self::new(vec![Step::Fail; failures], Step::Indexed(block_hash))
    }

    pub fn never_indexed() -> Self {
        Self::new(Vec::new(), Step::Absent)
    }

    /// When each query arrived
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl IndexerClient for ScriptedIndexer {
    async fn registration(&self, source: Address) -> Result<Option<IndexerRecord>, IndexerError> {
        self.calls.lock().push(Instant::now());
        let step = self.script.lock().pop_front().unwrap_or(self.then);
        match step {
            Step::Absent => Ok(None),
            Step::Fail => Err(IndexerError::Status(503)),
            Step::Indexed(block_hash) => Ok(Some(indexer_record(source, block_hash))),
        }
    }
}

/// Proof provider answering with a canned proof for the requested block
#[derive(Default)]
pub struct FakeProver {
    fail: bool,
    requests: Mutex<Vec<(H256, H256)>>,
}

impl FakeProver {
    pub fn failing() -> Self {
        Self {
            fail: true,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(H256, H256)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ProofProvider for FakeProver {
    async fn membership_proof(
        &self,
        block_hash: H256,
        leaf_key: H256,
    ) -> Result<MembershipProof, ProofError> {
        self.requests.lock().push((block_hash, leaf_key));
        if self.fail {
            return Err(ProofError::Rpc("unknown block".to_string()));
        }
        Ok(MembershipProof {
            at: block_hash,
            proof: vec![Bytes::from(vec![0x80, 0x01])],
        })
    }
}
