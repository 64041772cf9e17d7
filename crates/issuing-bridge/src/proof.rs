//! Membership proofs for indexed registrations.

use async_trait::async_trait;
use ethers::providers::{Http, Provider};
use ethers::types::H256;
use issuing_types::MembershipProof;

use crate::error::ProofError;

/// Storage key proved for every registration
pub const DEFAULT_LEAF_KEY: H256 = H256([
    0xf8, 0x86, 0x0d, 0xda, 0x3d, 0x08, 0x04, 0x6c, 0xf2, 0x70, 0x6b, 0x92, 0xbf, 0x72, 0x02, 0xea,
    0xae, 0x7a, 0x79, 0x19, 0x1c, 0x90, 0xe7, 0x62, 0x97, 0xe0, 0x89, 0x56, 0x05, 0xb8, 0xb4, 0x57,
]);

#[async_trait]
pub trait ProofProvider: Send + Sync {
    async fn membership_proof(
        &self,
        block_hash: H256,
        leaf_key: H256,
    ) -> Result<MembershipProof, ProofError>;
}

/// Proofs from a node's `state_getReadProof` RPC
pub struct RpcProofProvider {
    provider: Provider<Http>,
}

impl RpcProofProvider {
    pub fn connect(rpc_url: &str) -> Result<Self, ProofError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| ProofError::Config(format!("{}: {}", rpc_url, e)))?;
        Ok(Self { provider })
    }
}

#[async_trait]
impl ProofProvider for RpcProofProvider {
    async fn membership_proof(
        &self,
        block_hash: H256,
        leaf_key: H256,
    ) -> Result<MembershipProof, ProofError> {
        self.provider
            .request("state_getReadProof", (vec![leaf_key], block_hash))
            .await
            .map_err(|e| ProofError::Rpc(e.to_string()))
    }
}
