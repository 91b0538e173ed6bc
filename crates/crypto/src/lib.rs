//! # Finality Provider Crypto
//!
//! Cryptographic primitives for the finality-provider daemon:
//!
//! - **Schnorr** - BIP-340 style signatures over secp256k1
//! - **EOTS** - extractable one-time signatures; signing two different
//!   messages with the same one-time randomness reveals the secret key
//! - **Merkle** - RFC-6962 trees over public-randomness batches with
//!   per-leaf inclusion proofs
//! - **PoP** - proof-of-possession binding a BTC key to a chain account

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod eots;
pub mod merkle;
pub mod payload;
pub mod pop;
pub mod schnorr;

pub use merkle::Proof as MerkleProof;
pub use pop::{PopSigType, ProofOfPossession};
pub use schnorr::{SchnorrPublicKey, SchnorrSecretKey, SchnorrSignature};

use sha2::{Digest, Sha256};

/// Result type alias for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors from cryptographic operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// Byte slice had the wrong length for the expected type
    #[error("invalid input length: {0}")]
    InvalidInputLength(usize),

    /// Secret key bytes do not form a valid non-zero scalar
    #[error("failed to parse secret key")]
    SecretKeyParseFailed,

    /// Public key bytes do not name a curve point
    #[error("failed to parse public key")]
    PublicKeyParseFailed,

    /// Secret randomness bytes do not form a valid scalar
    #[error("failed to parse secret randomness")]
    SecretRandomnessParseFailed,

    /// Public randomness bytes do not name a curve point
    #[error("failed to parse public randomness")]
    PublicRandomnessParseFailed,

    /// Signature bytes do not parse
    #[error("failed to parse signature")]
    SignatureParseFailed,

    /// Signature did not verify
    #[error("signature verification failed")]
    VerificationFailed,

    /// Key extraction from a double-sign did not yield the expected key
    #[error("key extraction failed: {0}")]
    ExtractionFailed(String),

    /// Merkle tree or proof error
    #[error("merkle error: {0}")]
    Merkle(String),

    /// Invalid hex encoding
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

impl From<hex::FromHexError> for CryptoError {
    fn from(e: hex::FromHexError) -> Self {
        CryptoError::InvalidHex(e.to_string())
    }
}

/// Compute the SHA-256 digest of `data`.
#[inline]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Build a BIP-340 style tagged hasher: `SHA256(SHA256(tag) || SHA256(tag) || ...)`.
pub(crate) fn tagged_hash(tag: &[u8]) -> Sha256 {
    let tag_hash = Sha256::digest(tag);
    let mut digest = Sha256::new();
    digest.update(tag_hash);
    digest.update(tag_hash);
    digest
}
