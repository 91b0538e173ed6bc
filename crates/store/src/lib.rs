//! # Finality Provider Storage Layer
//!
//! Durable state for the finality-provider daemon:
//!
//! - **Database**: RocksDB wrapper with column families acting as buckets
//! - **FinalityProviderStore**: persisted finality-provider records keyed by
//!   their x-only BTC public key
//! - **PubRandProofStore**: Merkle inclusion proofs for committed
//!   public-randomness values, keyed by `(chain_id, btc_pk, height)`

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod db;
pub mod fp_store;
pub mod pub_rand_store;

pub use db::{Database, DatabaseConfig, WriteBatch};
pub use fp_store::{FinalityProviderStore, StoredFinalityProvider};
pub use pub_rand_store::PubRandProofStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying database error
    #[error("database error: {0}")]
    Database(String),

    /// Record (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Key not found in the given bucket
    #[error("not found: {0}")]
    NotFound(String),

    /// A finality provider with this BTC key already exists
    #[error("finality provider already exists: {0}")]
    DuplicateFinalityProvider(String),

    /// Attempted transition out of the terminal SLASHED status
    #[error("finality provider {0} is slashed; status is terminal")]
    SlashedIsTerminal(String),

    /// Attempted to move `last_voted_height` backwards
    #[error("non-monotonic last_voted_height for {pk}: stored {stored}, new {new}")]
    NonMonotonicVotedHeight {
        /// Hex of the provider's BTC key
        pk: String,
        /// Height currently persisted
        stored: u64,
        /// Rejected lower height
        new: u64,
    },

    /// Column family missing from the database
    #[error("column family not found: {0}")]
    ColumnFamilyNotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
