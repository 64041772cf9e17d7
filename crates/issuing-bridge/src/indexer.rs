//! Indexer Client
//!
//! Asks the off-chain indexer whether a registration transaction has been
//! included, and in which block.

use async_trait::async_trait;
use ethers::types::Address;
use issuing_types::IndexerRecord;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::IndexerError;

pub const REGISTER_PATH: &str = "api/ethereumIssuing/register";

#[async_trait]
pub trait IndexerClient: Send + Sync {
    /// Indexed registration for `source`, `None` while not yet indexed
    async fn registration(&self, source: Address) -> Result<Option<IndexerRecord>, IndexerError>;
}

/// Indexer reached over HTTP
pub struct HttpIndexer {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpIndexer {
    pub fn new(base_url: &str) -> Result<Self, IndexerError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: base.join(REGISTER_PATH)?,
        })
    }

    pub fn request_url(&self, source: Address) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("source", &format!("{:?}", source));
        url
    }
}

#[async_trait]
impl IndexerClient for HttpIndexer {
    async fn registration(&self, source: Address) -> Result<Option<IndexerRecord>, IndexerError> {
        let url = self.request_url(source);
        debug!(%url, "querying indexer");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IndexerError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_body(&body)
    }
}

/// Accepts a bare record, `null`, an empty body, or `{"data": ...}`
pub fn parse_body(body: &str) -> Result<Option<IndexerRecord>, IndexerError> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(None);
    }

    let value = match serde_json::from_str::<Value>(body)? {
        Value::Object(mut map) if map.contains_key("data") && !map.contains_key("block_hash") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };

    if value.is_null() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(value)?))
}
