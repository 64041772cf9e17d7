//! EVM gateway and metadata reader against a stub JSON-RPC node.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use ethers::abi::{self, Token};
use ethers::signers::LocalWallet;
use ethers::types::{Address, U256};
use ethers::utils::{hex, id};
use issuing_chain::{Chain, ChainConfig, ChainGateway, Erc20Metadata, EvmGateway, TokenMetadata};
use parking_lot::Mutex;
use serde_json::{json, Value};

const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

fn selector(signature: &str) -> String {
    format!("0x{}", hex::encode(id(signature)))
}

fn bytes32(text: &str) -> Token {
    let mut raw = [0u8; 32];
    raw[..text.len()].copy_from_slice(text.as_bytes());
    Token::FixedBytes(raw.to_vec())
}

/// Answers `eth_call` by function selector, reverting on unknown ones
#[derive(Clone, Default)]
struct NodeStub {
    results: Arc<HashMap<String, Vec<Token>>>,
    /// (to, selector) of every `eth_call`
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl NodeStub {
    fn new(results: Vec<(&str, Vec<Token>)>) -> Self {
        Self {
            results: Arc::new(
                results
                    .into_iter()
                    .map(|(signature, tokens)| (selector(signature), tokens))
                    .collect(),
            ),
            calls: Default::default(),
        }
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

async fn rpc(State(stub): State<NodeStub>, Json(request): Json<Value>) -> Json<Value> {
    let id = request["id"].clone();
    if request["method"] != "eth_call" {
        return Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32601, "message": "method not found" }
        }));
    }

    let tx = &request["params"][0];
    let data = tx["data"].as_str().or(tx["input"].as_str()).unwrap_or_default();
    let sel = data.get(..10).unwrap_or_default().to_lowercase();
    let to = tx["to"].as_str().unwrap_or_default().to_lowercase();
    stub.calls.lock().push((to, sel.clone()));

    match stub.results.get(&sel) {
        Some(tokens) => Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": format!("0x{}", hex::encode(abi::encode(tokens)))
        })),
        None => Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": 3, "message": "execution reverted" }
        })),
    }
}

async fn node(stub: NodeStub) -> String {
    let app = Router::new().route("/", post(rpc)).with_state(stub);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn config(rpc_url: &str, chain_id: u64) -> ChainConfig {
    ChainConfig {
        rpc_url: rpc_url.to_string(),
        chain_id,
        contract: Address::repeat_byte(chain_id as u8),
    }
}

async fn gateway(stub: &NodeStub) -> EvmGateway {
    let url = node(stub.clone()).await;
    let wallet: LocalWallet = TEST_KEY.parse().unwrap();
    EvmGateway::connect(&config(&url, 1), &config(&url, 43), wallet).unwrap()
}

async fn metadata(stub: &NodeStub, logos: HashMap<Address, String>) -> Erc20Metadata {
    let url = node(stub.clone()).await;
    Erc20Metadata::connect(&config(&url, 1), &config(&url, 43), logos).unwrap()
}

#[tokio::test]
async fn bytes32_symbol_token() {
    let stub = NodeStub::new(vec![("symbol()", vec![bytes32("MKR")])]);
    let token = Address::repeat_byte(0x9f);

    assert!(gateway(&stub).await.string_symbol(token).await.is_err());

    let symbol = metadata(&stub, HashMap::new())
        .await
        .bytes32_symbol(token)
        .await
        .unwrap();
    assert_eq!(symbol, "MKR");
}

#[tokio::test]
async fn string_symbol_token() {
    let stub = NodeStub::new(vec![("symbol()", vec![Token::String("DAI".into())])]);

    let symbol = gateway(&stub)
        .await
        .string_symbol(Address::repeat_byte(0x6b))
        .await
        .unwrap();
    assert_eq!(symbol, "DAI");
}

#[tokio::test]
async fn metadata_decodes_each_field_independently() {
    let stub = NodeStub::new(vec![
        ("name()", vec![Token::String("Maker".into())]),
        ("symbol()", vec![bytes32("MKR")]),
        ("decimals()", vec![Token::Uint(18.into())]),
    ]);
    let token = Address::repeat_byte(0x9f);
    let logos = HashMap::from([(token, "mkr.svg".to_string())]);

    let meta = metadata(&stub, logos)
        .await
        .metadata(Chain::Source, token)
        .await
        .unwrap();
    assert_eq!(meta.name, "Maker");
    assert_eq!(meta.symbol, "MKR");
    assert_eq!(meta.decimals, 18);
    assert_eq!(meta.logo.as_deref(), Some("mkr.svg"));

    let symbol_calls = stub
        .calls()
        .into_iter()
        .filter(|(_, sel)| *sel == selector("symbol()"))
        .count();
    let name_calls = stub
        .calls()
        .into_iter()
        .filter(|(_, sel)| *sel == selector("name()"))
        .count();
    assert_eq!(symbol_calls, 2);
    assert_eq!(name_calls, 1);
}

#[tokio::test]
async fn metadata_fails_without_decimals() {
    let stub = NodeStub::new(vec![
        ("name()", vec![Token::String("Dai".into())]),
        ("symbol()", vec![Token::String("DAI".into())]),
    ]);

    let result = metadata(&stub, HashMap::new())
        .await
        .metadata(Chain::Destination, Address::repeat_byte(0x6b))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn token_count_reads_the_chain_contract() {
    let stub = NodeStub::new(vec![
        ("assetLength()", vec![Token::Uint(3.into())]),
        ("tokenLength()", vec![Token::Uint(1.into())]),
    ]);
    let gateway = gateway(&stub).await;

    assert_eq!(gateway.token_count(Chain::Source).await.unwrap(), 3);
    assert_eq!(gateway.token_count(Chain::Destination).await.unwrap(), 1);

    let backing = format!("{:?}", Address::repeat_byte(1));
    let mapping = format!("{:?}", Address::repeat_byte(43));
    assert_eq!(
        stub.calls(),
        vec![
            (backing, selector("assetLength()")),
            (mapping, selector("tokenLength()")),
        ]
    );
}

#[tokio::test]
async fn registration_record_decodes_target_and_timestamp() {
    let target = Address::repeat_byte(0x77);
    let stub = NodeStub::new(vec![(
        "assets(address)",
        vec![Token::Address(target), Token::Uint(1_617_235_200u64.into())],
    )]);

    let record = gateway(&stub)
        .await
        .registration_record(Address::repeat_byte(0x9f))
        .await
        .unwrap();
    assert_eq!(record.target, target);
    assert_eq!(record.timestamp, U256::from(1_617_235_200u64));
}
