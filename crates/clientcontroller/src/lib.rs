//! # Client Controller
//!
//! The consumer-chain RPC abstraction. The daemon core only ever talks to
//! the chain through the [`ClientController`] trait: queries for blocks,
//! voting power and commitments, and submissions for registration,
//! randomness commits, finality signatures and unjailing.
//!
//! Submission failures are classified into four kinds — retriable,
//! permanent, already-submitted and double-sign — which drive the retry
//! and reconciliation behavior of the signing loops.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod rpc;

pub use rpc::{JsonRpcClientController, JsonRpcClientConfig};

use async_trait::async_trait;

use fp_crypto::{MerkleProof, ProofOfPossession, SchnorrSignature};
use fp_types::{BlockInfo, BtcPk, CommissionRate, Description, PubRandCommit, TxResponse};

/// Result type for chain operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Chain interaction errors, classified by how the caller should react.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// Transient failure; retry with backoff
    #[error("retriable chain error: {0}")]
    Retriable(String),

    /// Definitive rejection; retrying the same submission cannot succeed
    #[error("permanent chain error: {0}")]
    Permanent(String),

    /// The chain already holds an equivalent submission; treat as success
    /// of a prior attempt and reconcile from queried state
    #[error("already submitted: {0}")]
    AlreadySubmitted(String),

    /// The chain detected an equivocation for this height
    #[error("double sign rejected by chain: {0}")]
    DoubleSign(String),

    /// The response did not match the expected shape
    #[error("invalid chain response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Whether the operation should be retried with backoff.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Retriable(_))
    }

    /// Whether the chain already holds an equivalent submission.
    pub fn is_already_submitted(&self) -> bool {
        matches!(self, Self::AlreadySubmitted(_))
    }

    /// Whether the chain reported an equivocation.
    pub fn is_double_sign(&self) -> bool {
        matches!(self, Self::DoubleSign(_))
    }
}

/// The consumer-chain RPC surface used by the daemon core.
///
/// Implementations must be safe for concurrent use; one controller is
/// shared by every loop of every instance.
#[async_trait]
pub trait ClientController: Send + Sync {
    /// The current chain tip.
    async fn query_best_block(&self) -> Result<BlockInfo>;

    /// The block at a specific height.
    async fn query_block(&self, height: u64) -> Result<BlockInfo>;

    /// First height at which the staking protocol is active.
    async fn query_activated_height(&self) -> Result<u64>;

    /// First height at which finality voting is active.
    async fn query_finality_activation_block_height(&self) -> Result<u64>;

    /// Voting power of the finality provider at a height.
    async fn query_finality_provider_voting_power(
        &self,
        btc_pk: &BtcPk,
        height: u64,
    ) -> Result<u64>;

    /// `(slashed, jailed)` flags for the finality provider.
    async fn query_finality_provider_slashed_or_jailed(
        &self,
        btc_pk: &BtcPk,
    ) -> Result<(bool, bool)>;

    /// The most recent public-randomness commitments for the provider,
    /// ascending by start height, at most `count` entries.
    async fn query_last_committed_public_rand(
        &self,
        btc_pk: &BtcPk,
        count: u64,
    ) -> Result<Vec<PubRandCommit>>;

    /// The latest finalized blocks, newest first, at most `count` entries.
    async fn query_latest_finalized_blocks(&self, count: u64) -> Result<Vec<BlockInfo>>;

    /// Register the finality provider on-chain.
    async fn register_finality_provider(
        &self,
        btc_pk: &BtcPk,
        pop: &ProofOfPossession,
        commission: CommissionRate,
        description: &Description,
    ) -> Result<TxResponse>;

    /// Commit a Merkle root over a public-randomness batch.
    async fn commit_pub_rand_list(
        &self,
        btc_pk: &BtcPk,
        start_height: u64,
        num_pub_rand: u64,
        commitment: &[u8; 32],
        sig: &SchnorrSignature,
    ) -> Result<TxResponse>;

    /// Submit a single finality signature.
    async fn submit_finality_sig(
        &self,
        btc_pk: &BtcPk,
        block: &BlockInfo,
        proof: &MerkleProof,
        pub_rand: &[u8; 32],
        sig: &[u8; 32],
    ) -> Result<TxResponse>;

    /// Submit a batch of finality signatures atomically.
    async fn submit_batch_finality_sigs(
        &self,
        btc_pk: &BtcPk,
        blocks: &[BlockInfo],
        proofs: &[MerkleProof],
        pub_rands: &[[u8; 32]],
        sigs: &[[u8; 32]],
    ) -> Result<TxResponse>;

    /// Send an unjail transaction for the finality provider.
    async fn unjail_finality_provider(&self, btc_pk: &BtcPk) -> Result<TxResponse>;

    /// Release the connection.
    async fn close(&self) -> Result<()>;
}
