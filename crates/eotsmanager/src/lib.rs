//! # EOTS Manager
//!
//! The EOTS manager is the sole holder of BTC private key material. The rest
//! of the daemon treats it as an opaque, potentially remote signing oracle:
//! it creates keys, produces BIP-340 Schnorr signatures, generates one-time
//! public randomness batches, and signs finality votes with EOTS — refusing
//! to ever sign two different messages at the same `(key, chain, height)`.
//!
//! [`LocalEotsManager`] is the embedded implementation backed by the
//! daemon's storage layer. A remote gRPC-backed signer would implement the
//! same [`EotsManager`] trait.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod local;

pub use local::LocalEotsManager;

use async_trait::async_trait;

use fp_crypto::{CryptoError, SchnorrSignature};
use fp_store::StoreError;
use fp_types::BtcPk;

/// Result type for EOTS manager operations.
pub type Result<T> = std::result::Result<T, EotsManagerError>;

/// Errors returned by an EOTS manager.
#[derive(Debug, thiserror::Error)]
pub enum EotsManagerError {
    /// A key with this name already exists
    #[error("key name already in use: {0}")]
    KeyAlreadyExists(String),

    /// No key found for the given name or public key
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Passphrase does not unlock the key
    #[error("invalid passphrase for key {0}")]
    InvalidPassphrase(String),

    /// Refused to sign a second message at an already-signed height
    #[error(
        "double sign refused for height {height} on chain {chain_id}: \
         a different message was already signed"
    )]
    DoubleSign {
        /// Chain the vote targets
        chain_id: String,
        /// Height already signed at
        height: u64,
    },

    /// Underlying storage failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Cryptographic failure
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Remote signer transport failure
    #[error("signer rpc error: {0}")]
    Rpc(String),
}

impl EotsManagerError {
    /// Whether this error is the signer's double-sign refusal.
    pub fn is_double_sign(&self) -> bool {
        matches!(self, Self::DoubleSign { .. })
    }
}

/// A key record exposed for testing paths.
///
/// Production signers MAY refuse to return this.
#[derive(Debug, Clone)]
pub struct KeyRecord {
    /// Keyring alias
    pub name: String,
    /// Raw secret key scalar
    pub secret_key: [u8; 32],
}

/// The signing oracle contract.
///
/// Implementations must be safe for concurrent use; the daemon shares one
/// manager across all of an instance's loops.
#[async_trait]
pub trait EotsManager: Send + Sync {
    /// Create a new EOTS key under the given keyring alias.
    async fn create_key(&self, name: &str, passphrase: &str, hd_path: &str) -> Result<BtcPk>;

    /// Return the key record, including the secret key. Testing paths only.
    async fn key_record(&self, btc_pk: &BtcPk, passphrase: &str) -> Result<KeyRecord>;

    /// Produce a BIP-340 Schnorr signature over a 32-byte message hash.
    async fn sign_schnorr(
        &self,
        btc_pk: &BtcPk,
        msg_hash: &[u8; 32],
        passphrase: &str,
    ) -> Result<SchnorrSignature>;

    /// Generate `num` one-time public randomness values for consecutive
    /// heights starting at `start_height`.
    ///
    /// The manager guarantees a `(key, chain, height)` never maps to two
    /// different randomness values.
    async fn create_randomness_pair_list(
        &self,
        btc_pk: &BtcPk,
        chain_id: &str,
        start_height: u64,
        num: u64,
    ) -> Result<Vec<[u8; 32]>>;

    /// Produce an EOTS signature over `msg_hash` at the given height.
    ///
    /// Fails with [`EotsManagerError::DoubleSign`] if a different message
    /// was already signed for `(btc_pk, chain_id, height)`.
    async fn sign_eots(
        &self,
        btc_pk: &BtcPk,
        chain_id: &str,
        msg_hash: &[u8; 32],
        height: u64,
        passphrase: &str,
    ) -> Result<[u8; 32]>;

    /// Release any resources held by the manager.
    async fn close(&self) -> Result<()>;
}
