//! Merkle inclusion proofs for committed public randomness.
//!
//! Proofs are written in bulk, in one atomic batch, strictly before the
//! batch's Merkle root is broadcast on-chain. They are never mutated and
//! are retained after finalization.

use std::sync::Arc;

use fp_crypto::MerkleProof;
use fp_types::BtcPk;

use crate::db::{cf, Database, WriteBatch};
use crate::{Result, StoreError};

/// Store of per-height public-randomness inclusion proofs.
pub struct PubRandProofStore {
    db: Arc<Database>,
}

impl PubRandProofStore {
    /// Create a store over the shared database.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Bucket key: `chain_id || btc_pk || be64(height)`.
    fn key(chain_id: &str, btc_pk: &BtcPk, height: u64) -> Vec<u8> {
        let id = chain_id.as_bytes();
        let mut key = Vec::with_capacity(id.len() + 32 + 8);
        key.extend_from_slice(id);
        key.extend_from_slice(btc_pk);
        key.extend_from_slice(&height.to_be_bytes());
        key
    }

    /// Persist the proofs for a batch starting at `start_height`, atomically.
    ///
    /// Proof `i` lands at height `start_height + i`.
    pub fn add_pub_rand_proofs(
        &self,
        chain_id: &str,
        btc_pk: &BtcPk,
        start_height: u64,
        proofs: &[MerkleProof],
    ) -> Result<()> {
        let cf_handle = self.db.cf_handle(cf::PUB_RAND_PROOFS)?;
        let mut batch = WriteBatch::new();
        for (i, proof) in proofs.iter().enumerate() {
            let key = Self::key(chain_id, btc_pk, start_height + i as u64);
            let value =
                bincode::serialize(proof).map_err(|e| StoreError::Serialization(e.to_string()))?;
            batch.put_cf(&cf_handle, &key, &value);
        }
        drop(cf_handle);
        self.db.write(batch)
    }

    /// Load the proof for a single height.
    pub fn get_pub_rand_proof(
        &self,
        chain_id: &str,
        btc_pk: &BtcPk,
        height: u64,
    ) -> Result<MerkleProof> {
        let key = Self::key(chain_id, btc_pk, height);
        let bytes = self
            .db
            .get_cf(cf::PUB_RAND_PROOFS, &key)?
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "pub rand proof for ({chain_id}, {}, {height})",
                    hex::encode(btc_pk)
                ))
            })?;
        bincode::deserialize(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Load the proofs for consecutive heights `[start_height, start_height + num)`.
    pub fn get_pub_rand_proof_list(
        &self,
        chain_id: &str,
        btc_pk: &BtcPk,
        start_height: u64,
        num: u64,
    ) -> Result<Vec<MerkleProof>> {
        (0..num)
            .map(|i| self.get_pub_rand_proof(chain_id, btc_pk, start_height + i))
            .collect()
    }
}
