//! # Finality Provider Types
//!
//! Core type definitions for the finality-provider daemon.
//!
//! This crate provides the fundamental types used throughout the daemon:
//! - [`BlockInfo`] - the daemon's minimal view of a consumer-chain block
//! - [`PubRandCommit`] - an on-chain public-randomness commitment descriptor
//! - [`FinalityProviderStatus`] - the lifecycle status of a finality provider
//! - [`Description`] and [`CommissionRate`] - registration metadata
//!
//! ## Example
//!
//! ```rust
//! use fp_types::{BlockInfo, FinalityProviderStatus, PubRandCommit};
//!
//! let block = BlockInfo { height: 101, hash: [0xab; 32] };
//! let commit = PubRandCommit { start_height: 101, num_pub_rand: 1000, commitment: [0; 32] };
//!
//! assert!(commit.covers(block.height));
//! assert!(FinalityProviderStatus::Slashed.is_terminal());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod block;
pub mod commit;
pub mod description;
pub mod status;

pub use block::{BlockInfo, TxResponse};
pub use commit::PubRandCommit;
pub use description::{CommissionRate, Description};
pub use status::FinalityProviderStatus;

/// A 32-byte x-only BIP-340 BTC public key.
pub type BtcPk = [u8; 32];

/// Result type alias for type-level operations.
pub type Result<T> = std::result::Result<T, TypesError>;

/// Errors that can occur when parsing or validating shared types.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Invalid length for a fixed-size type
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid commission rate
    #[error("invalid commission rate: {0}")]
    InvalidCommission(String),

    /// Invalid account address
    #[error("invalid account address: {0}")]
    InvalidAddress(String),
}

/// Parse a 32-byte x-only BTC public key from a hex string.
pub fn btc_pk_from_hex(s: &str) -> Result<BtcPk> {
    let bytes = hex::decode(s.trim_start_matches("0x"))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| TypesError::InvalidLength {
            expected: 32,
            actual: bytes.len(),
        })
}

/// Lightweight shape check for a bech32-style account address.
///
/// The daemon treats addresses as opaque identity tokens; full checksum
/// verification is the chain's job. This only rejects strings that cannot
/// possibly be bech32 (wrong case, missing separator, bad charset).
pub fn validate_account_address(addr: &str) -> Result<()> {
    const CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";

    let sep = addr
        .rfind('1')
        .ok_or_else(|| TypesError::InvalidAddress(format!("missing separator: {addr}")))?;
    if sep == 0 || sep + 1 >= addr.len() {
        return Err(TypesError::InvalidAddress(format!(
            "empty prefix or payload: {addr}"
        )));
    }
    if addr.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(TypesError::InvalidAddress(format!(
            "mixed or upper case: {addr}"
        )));
    }
    if addr[sep + 1..].chars().any(|c| !CHARSET.contains(c)) {
        return Err(TypesError::InvalidAddress(format!(
            "invalid payload charset: {addr}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn btc_pk_hex_roundtrip() {
        let pk = [7u8; 32];
        let parsed = btc_pk_from_hex(&hex::encode(pk)).unwrap();
        assert_eq!(parsed, pk);

        assert!(btc_pk_from_hex("deadbeef").is_err());
        assert!(btc_pk_from_hex("zz").is_err());
    }

    #[test]
    fn account_address_shape() {
        assert!(validate_account_address("fp1qpzry9x8gf2tvdw0").is_ok());
        assert!(validate_account_address("noseparator").is_err());
        assert!(validate_account_address("FP1QPZRY").is_err());
        assert!(validate_account_address("fp1bio").is_err()); // 'b', 'i', 'o' not in charset
        assert!(validate_account_address("1payload").is_err());
    }
}
