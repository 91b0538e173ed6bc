//! JSON-RPC backed [`ClientController`] implementation.
//!
//! Maps each trait method onto an `fp_*` namespaced JSON-RPC method over
//! HTTP and classifies transport and call errors into [`ClientError`]
//! kinds. The wire DTOs carry binary fields hex-encoded.

use std::time::Duration;

use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::ClientError as RpcError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::{Deserialize, Serialize};
use tracing::debug;

use fp_crypto::{MerkleProof, ProofOfPossession, SchnorrSignature};
use fp_types::{BlockInfo, BtcPk, CommissionRate, Description, PubRandCommit, TxResponse};

use crate::{ClientController, ClientError, Result};

/// Configuration for the JSON-RPC controller.
#[derive(Debug, Clone)]
pub struct JsonRpcClientConfig {
    /// HTTP endpoint of the consumer-chain RPC node
    pub rpc_addr: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

/// [`ClientController`] over a jsonrpsee HTTP client.
pub struct JsonRpcClientController {
    client: HttpClient,
}

impl JsonRpcClientController {
    /// Connect to the configured endpoint.
    pub fn new(config: &JsonRpcClientConfig) -> Result<Self> {
        let client = HttpClientBuilder::default()
            .request_timeout(config.request_timeout)
            .build(&config.rpc_addr)
            .map_err(|e| ClientError::Permanent(format!("failed to build rpc client: {e}")))?;
        Ok(Self { client })
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: &'static str,
        params: jsonrpsee::core::params::ArrayParams,
    ) -> Result<T> {
        debug!(method = method, "chain rpc request");
        self.client
            .request(method, params)
            .await
            .map_err(classify_rpc_error)
    }
}

/// Classify a jsonrpsee error into the caller-facing kinds.
fn classify_rpc_error(err: RpcError) -> ClientError {
    match err {
        RpcError::Call(call) => {
            let msg = call.message().to_ascii_lowercase();
            if msg.contains("double sign")
                || msg.contains("duplicate vote")
                || msg.contains("equivocation")
            {
                ClientError::DoubleSign(call.message().to_string())
            } else if msg.contains("already") {
                ClientError::AlreadySubmitted(call.message().to_string())
            } else {
                ClientError::Permanent(call.message().to_string())
            }
        }
        RpcError::Transport(e) => ClientError::Retriable(e.to_string()),
        RpcError::RequestTimeout => ClientError::Retriable("request timeout".into()),
        RpcError::RestartNeeded(e) => ClientError::Retriable(e.to_string()),
        other => ClientError::Permanent(other.to_string()),
    }
}

fn parse_hash32(s: &str, what: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| ClientError::InvalidResponse(format!("bad {what} hex: {e}")))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| ClientError::InvalidResponse(format!("{what} is not 32 bytes")))
}

#[derive(Debug, Deserialize)]
struct BlockDto {
    height: u64,
    hash: String,
}

impl BlockDto {
    fn into_block(self) -> Result<BlockInfo> {
        Ok(BlockInfo {
            height: self.height,
            hash: parse_hash32(&self.hash, "block hash")?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PubRandCommitDto {
    start_height: u64,
    num_pub_rand: u64,
    commitment: String,
}

#[derive(Debug, Deserialize)]
struct SlashedJailedDto {
    slashed: bool,
    jailed: bool,
}

#[derive(Debug, Deserialize)]
struct TxResponseDto {
    tx_hash: String,
}

#[derive(Debug, Serialize)]
struct ProofDto {
    total: u64,
    index: u64,
    leaf_hash: String,
    aunts: Vec<String>,
}

impl From<&MerkleProof> for ProofDto {
    fn from(p: &MerkleProof) -> Self {
        Self {
            total: p.total,
            index: p.index,
            leaf_hash: hex::encode(&p.leaf_hash),
            aunts: p.aunts.iter().map(hex::encode).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DescriptionDto<'a> {
    moniker: &'a str,
    identity: &'a str,
    website: &'a str,
    security_contact: &'a str,
    details: &'a str,
}

#[async_trait]
impl ClientController for JsonRpcClientController {
    async fn query_best_block(&self) -> Result<BlockInfo> {
        let dto: BlockDto = self.request("fp_queryBestBlock", rpc_params![]).await?;
        dto.into_block()
    }

    async fn query_block(&self, height: u64) -> Result<BlockInfo> {
        let dto: BlockDto = self.request("fp_queryBlock", rpc_params![height]).await?;
        dto.into_block()
    }

    async fn query_activated_height(&self) -> Result<u64> {
        self.request("fp_queryActivatedHeight", rpc_params![]).await
    }

    async fn query_finality_activation_block_height(&self) -> Result<u64> {
        self.request("fp_queryFinalityActivationBlockHeight", rpc_params![])
            .await
    }

    async fn query_finality_provider_voting_power(
        &self,
        btc_pk: &BtcPk,
        height: u64,
    ) -> Result<u64> {
        self.request(
            "fp_queryFinalityProviderVotingPower",
            rpc_params![hex::encode(btc_pk), height],
        )
        .await
    }

    async fn query_finality_provider_slashed_or_jailed(
        &self,
        btc_pk: &BtcPk,
    ) -> Result<(bool, bool)> {
        let dto: SlashedJailedDto = self
            .request(
                "fp_queryFinalityProviderSlashedOrJailed",
                rpc_params![hex::encode(btc_pk)],
            )
            .await?;
        Ok((dto.slashed, dto.jailed))
    }

    async fn query_last_committed_public_rand(
        &self,
        btc_pk: &BtcPk,
        count: u64,
    ) -> Result<Vec<PubRandCommit>> {
        let dtos: Vec<PubRandCommitDto> = self
            .request(
                "fp_queryLastCommittedPublicRand",
                rpc_params![hex::encode(btc_pk), count],
            )
            .await?;
        dtos.into_iter()
            .map(|dto| {
                Ok(PubRandCommit {
                    start_height: dto.start_height,
                    num_pub_rand: dto.num_pub_rand,
                    commitment: parse_hash32(&dto.commitment, "commitment")?,
                })
            })
            .collect()
    }

    async fn query_latest_finalized_blocks(&self, count: u64) -> Result<Vec<BlockInfo>> {
        let dtos: Vec<BlockDto> = self
            .request("fp_queryLatestFinalizedBlocks", rpc_params![count])
            .await?;
        dtos.into_iter().map(BlockDto::into_block).collect()
    }

    async fn register_finality_provider(
        &self,
        btc_pk: &BtcPk,
        pop: &ProofOfPossession,
        commission: CommissionRate,
        description: &Description,
    ) -> Result<TxResponse> {
        let description = DescriptionDto {
            moniker: &description.moniker,
            identity: &description.identity,
            website: &description.website,
            security_contact: &description.security_contact,
            details: &description.details,
        };
        let dto: TxResponseDto = self
            .request(
                "fp_registerFinalityProvider",
                rpc_params![
                    hex::encode(btc_pk),
                    hex::encode(pop.btc_sig.to_bytes()),
                    commission.to_string(),
                    description
                ],
            )
            .await?;
        Ok(TxResponse::new(dto.tx_hash))
    }

    async fn commit_pub_rand_list(
        &self,
        btc_pk: &BtcPk,
        start_height: u64,
        num_pub_rand: u64,
        commitment: &[u8; 32],
        sig: &SchnorrSignature,
    ) -> Result<TxResponse> {
        let dto: TxResponseDto = self
            .request(
                "fp_commitPubRandList",
                rpc_params![
                    hex::encode(btc_pk),
                    start_height,
                    num_pub_rand,
                    hex::encode(commitment),
                    hex::encode(sig.to_bytes())
                ],
            )
            .await?;
        Ok(TxResponse::new(dto.tx_hash))
    }

    async fn submit_finality_sig(
        &self,
        btc_pk: &BtcPk,
        block: &BlockInfo,
        proof: &MerkleProof,
        pub_rand: &[u8; 32],
        sig: &[u8; 32],
    ) -> Result<TxResponse> {
        self.submit_batch_finality_sigs(
            btc_pk,
            std::slice::from_ref(block),
            std::slice::from_ref(proof),
            std::slice::from_ref(pub_rand),
            std::slice::from_ref(sig),
        )
        .await
    }

    async fn submit_batch_finality_sigs(
        &self,
        btc_pk: &BtcPk,
        blocks: &[BlockInfo],
        proofs: &[MerkleProof],
        pub_rands: &[[u8; 32]],
        sigs: &[[u8; 32]],
    ) -> Result<TxResponse> {
        let heights: Vec<u64> = blocks.iter().map(|b| b.height).collect();
        let hashes: Vec<String> = blocks.iter().map(|b| hex::encode(b.hash)).collect();
        let proofs: Vec<ProofDto> = proofs.iter().map(ProofDto::from).collect();
        let pub_rands: Vec<String> = pub_rands.iter().map(hex::encode).collect();
        let sigs: Vec<String> = sigs.iter().map(hex::encode).collect();

        let dto: TxResponseDto = self
            .request(
                "fp_submitBatchFinalitySigs",
                rpc_params![hex::encode(btc_pk), heights, hashes, proofs, pub_rands, sigs],
            )
            .await?;
        Ok(TxResponse::new(dto.tx_hash))
    }

    async fn unjail_finality_provider(&self, btc_pk: &BtcPk) -> Result<TxResponse> {
        let dto: TxResponseDto = self
            .request("fp_unjailFinalityProvider", rpc_params![hex::encode(btc_pk)])
            .await?;
        Ok(TxResponse::new(dto.tx_hash))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
