//! Persisted finality-provider records.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use fp_crypto::ProofOfPossession;
use fp_types::{BtcPk, CommissionRate, Description, FinalityProviderStatus};

use crate::db::{cf, Database};
use crate::{Result, StoreError};

/// A finality provider as persisted in the `finality_providers` bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFinalityProvider {
    /// Consumer-chain account address (bech32)
    pub fp_addr: String,
    /// 32-byte x-only BTC public key; primary key of the record
    pub btc_pk: BtcPk,
    /// Local keyring alias for the chain account
    pub key_name: String,
    /// Target consumer chain
    pub chain_id: String,
    /// Registration metadata
    pub description: Description,
    /// Commission rate in [0, 1]
    pub commission: CommissionRate,
    /// Proof-of-possession binding `btc_pk` to `fp_addr`
    pub pop: ProofOfPossession,
    /// Lifecycle status
    pub status: FinalityProviderStatus,
    /// Highest height this provider has voted at; monotonic, initially 0
    pub last_voted_height: u64,
}

impl StoredFinalityProvider {
    /// Whether a live instance may be started for this provider.
    pub fn should_start(&self) -> bool {
        self.status.is_startable()
    }

    /// Hex rendering of the BTC public key.
    pub fn btc_pk_hex(&self) -> String {
        hex::encode(self.btc_pk)
    }
}

/// Store of finality-provider records, keyed by BTC public key.
///
/// Status and voted-height updates are read-modify-write; a store-level lock
/// serializes them so concurrent writers (the instance's status loop and the
/// app's sync loop) cannot interleave a lost update.
pub struct FinalityProviderStore {
    db: Arc<Database>,
    write_lock: Mutex<()>,
}

impl FinalityProviderStore {
    /// Create a store over the shared database.
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
        }
    }

    /// Persist a new finality provider in status `Created`.
    ///
    /// Fails with [`StoreError::DuplicateFinalityProvider`] when a record
    /// with the same BTC key already exists; the original record is kept.
    #[allow(clippy::too_many_arguments)]
    pub fn create_finality_provider(
        &self,
        fp_addr: &str,
        btc_pk: &BtcPk,
        description: Description,
        commission: CommissionRate,
        key_name: &str,
        chain_id: &str,
        pop: ProofOfPossession,
    ) -> Result<()> {
        let _guard = self.write_lock.lock();

        if self.db.get_cf(cf::FINALITY_PROVIDERS, btc_pk)?.is_some() {
            return Err(StoreError::DuplicateFinalityProvider(hex::encode(btc_pk)));
        }

        let fp = StoredFinalityProvider {
            fp_addr: fp_addr.to_string(),
            btc_pk: *btc_pk,
            key_name: key_name.to_string(),
            chain_id: chain_id.to_string(),
            description,
            commission,
            pop,
            status: FinalityProviderStatus::Created,
            last_voted_height: 0,
        };
        self.put(&fp)?;

        info!(
            btc_pk = %fp.btc_pk_hex(),
            fp_addr = %fp.fp_addr,
            "stored new finality provider"
        );
        Ok(())
    }

    /// Load the finality provider with the given BTC key.
    pub fn get_finality_provider(&self, btc_pk: &BtcPk) -> Result<StoredFinalityProvider> {
        let bytes = self
            .db
            .get_cf(cf::FINALITY_PROVIDERS, btc_pk)?
            .ok_or_else(|| StoreError::NotFound(hex::encode(btc_pk)))?;
        bincode::deserialize(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Load every stored finality provider.
    pub fn get_all_finality_providers(&self) -> Result<Vec<StoredFinalityProvider>> {
        self.db
            .scan_cf(cf::FINALITY_PROVIDERS)?
            .into_iter()
            .map(|(_, value)| {
                bincode::deserialize(&value).map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .collect()
    }

    /// Persist a new status for the provider.
    ///
    /// Transitions out of `Slashed` are refused; the status is terminal.
    pub fn set_status(&self, btc_pk: &BtcPk, status: FinalityProviderStatus) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut fp = self.get_finality_provider(btc_pk)?;
        if !fp.status.can_transition_to(status) {
            return Err(StoreError::SlashedIsTerminal(hex::encode(btc_pk)));
        }
        if fp.status == status {
            return Ok(());
        }
        fp.status = status;
        self.put(&fp)
    }

    /// Persist a new `last_voted_height`.
    ///
    /// Heights below the stored value are an invariant violation and are
    /// refused; equal heights are a no-op.
    pub fn set_last_voted_height(&self, btc_pk: &BtcPk, height: u64) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut fp = self.get_finality_provider(btc_pk)?;
        if height < fp.last_voted_height {
            return Err(StoreError::NonMonotonicVotedHeight {
                pk: hex::encode(btc_pk),
                stored: fp.last_voted_height,
                new: height,
            });
        }
        if height == fp.last_voted_height {
            return Ok(());
        }
        fp.last_voted_height = height;
        self.put(&fp)
    }

    /// Derive and persist the status implied by an observed voting power.
    ///
    /// Power above zero always promotes to `Active`; an `Active` provider
    /// that lost its power demotes to `Inactive`. Jail and slash flags are
    /// handled by the caller, which sees them from a separate query.
    pub fn update_status_from_voting_power(
        &self,
        btc_pk: &BtcPk,
        voting_power: u64,
    ) -> Result<FinalityProviderStatus> {
        let current = self.get_finality_provider(btc_pk)?.status;
        if current.is_terminal() {
            return Ok(current);
        }

        let next = if voting_power > 0 {
            FinalityProviderStatus::Active
        } else if current == FinalityProviderStatus::Active {
            FinalityProviderStatus::Inactive
        } else {
            current
        };

        if next != current {
            self.set_status(btc_pk, next)?;
        }
        Ok(next)
    }

    fn put(&self, fp: &StoredFinalityProvider) -> Result<()> {
        let bytes =
            bincode::serialize(fp).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.db.put_cf(cf::FINALITY_PROVIDERS, &fp.btc_pk, &bytes)
    }
}
