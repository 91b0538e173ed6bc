//! # Finality Provider Service
//!
//! The daemon's moving parts:
//!
//! - [`FinalityProviderInstance`] - a per-provider actor running the
//!   randomness-commit, finality-submission and status-update loops
//! - [`FinalityProviderManager`] - instance lifecycle (at most one active)
//!   and the critical-error monitor
//! - [`FinalityProviderApp`] - channel-mediated create/register/unjail
//!   operations and the app-level worker loops
//! - [`ChainPoller`] - ordered block feed from the consumer chain
//!
//! ## Safety properties
//!
//! - `last_voted_height` is monotonic; only the submission loop writes it
//! - randomness proofs are fully persisted before their Merkle root is
//!   broadcast on-chain
//! - an invariant violation (e.g. a missing proof for a height the chain
//!   expects a vote at) is surfaced once on the instance's critical-error
//!   channel; the manager stops the instance and leaves its state intact

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod app;
pub mod fp_instance;
pub mod fp_manager;
pub mod keyring;
pub mod metrics;
pub mod poller;

pub use app::{AppError, FinalityProviderApp, RegisterFinalityProviderResponse};
pub use fp_instance::FinalityProviderInstance;
pub use fp_manager::{FinalityProviderInfo, FinalityProviderManager, ManagerError};
pub use keyring::{ChainKeyInfo, ChainKeyring, KeyringError};
pub use metrics::FpMetrics;
pub use poller::ChainPoller;

use fp_clientcontroller::ClientError;
use fp_crypto::CryptoError;
use fp_eotsmanager::EotsManagerError;
use fp_store::StoreError;
use fp_types::BtcPk;

/// Errors raised by a finality-provider instance.
#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    /// Storage failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// EOTS manager failure
    #[error("eots manager error: {0}")]
    Eots(#[from] EotsManagerError),

    /// Chain interaction failure
    #[error("chain error: {0}")]
    Client(#[from] ClientError),

    /// Cryptographic failure
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The chain expects a vote at a height we hold no randomness proof for
    #[error("missing public randomness proof for chain {chain_id} height {height}")]
    MissingPubRandProof {
        /// Chain the vote targets
        chain_id: String,
        /// Height with no persisted proof
        height: u64,
    },

    /// The provider's stored status forbids running an instance
    #[error("finality provider is not eligible to run: status {0}")]
    NotEligible(String),

    /// A retriable submission kept failing past the configured retry budget
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Last observed error
        last_error: String,
    },
}

impl InstanceError {
    /// Whether this error must stop the instance (invariant violation or
    /// exhausted retry budget) rather than be absorbed by the loop.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::Store(_) | Self::MissingPubRandProof { .. } | Self::RetriesExhausted { .. }
        )
    }
}

/// An invariant violation escalated by one of an instance's tasks.
///
/// The manager reacts by stopping the instance; persistent state is left
/// intact for inspection.
#[derive(Debug)]
pub struct CriticalError {
    /// BTC key of the instance that hit the violation
    pub btc_pk: BtcPk,
    /// The underlying error
    pub error: InstanceError,
}

impl std::fmt::Display for CriticalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "critical error for finality provider {}: {}",
            hex::encode(self.btc_pk),
            self.error
        )
    }
}
