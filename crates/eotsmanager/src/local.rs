//! Embedded EOTS manager backed by the daemon's storage layer.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use fp_crypto::eots;
use fp_crypto::{SchnorrSecretKey, SchnorrSignature};
use fp_store::db::cf;
use fp_store::{Database, StoreError};
use fp_types::BtcPk;

use crate::{EotsManager, EotsManagerError, KeyRecord, Result};

const NAME_KEY_PREFIX: &[u8] = b"name/";
const PK_KEY_PREFIX: &[u8] = b"pk/";

/// Persisted key record.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEotsKey {
    name: String,
    secret_key: [u8; 32],
    passphrase_tag: [u8; 32],
    hd_path: String,
}

/// Record of a produced EOTS signature; one per `(chain, key, height)`.
#[derive(Debug, Serialize, Deserialize)]
struct SignRecord {
    msg_hash: [u8; 32],
}

/// Local EOTS manager: keys and sign records live in the manager's own
/// database, opened at a path distinct from the finality-provider stores.
pub struct LocalEotsManager {
    db: Arc<Database>,
    write_lock: Mutex<()>,
}

impl LocalEotsManager {
    /// Create a manager over its dedicated database.
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
        }
    }

    fn passphrase_tag(passphrase: &str, btc_pk: &BtcPk) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"fpd/eots-passphrase");
        hasher.update(passphrase.as_bytes());
        hasher.update(btc_pk);
        hasher.finalize().into()
    }

    fn pk_key(btc_pk: &BtcPk) -> Vec<u8> {
        let mut key = PK_KEY_PREFIX.to_vec();
        key.extend_from_slice(btc_pk);
        key
    }

    fn name_key(name: &str) -> Vec<u8> {
        let mut key = NAME_KEY_PREFIX.to_vec();
        key.extend_from_slice(name.as_bytes());
        key
    }

    fn sign_record_key(chain_id: &str, btc_pk: &BtcPk, height: u64) -> Vec<u8> {
        let id = chain_id.as_bytes();
        let mut key = Vec::with_capacity(id.len() + 32 + 8);
        key.extend_from_slice(id);
        key.extend_from_slice(btc_pk);
        key.extend_from_slice(&height.to_be_bytes());
        key
    }

    fn load_stored_key(&self, btc_pk: &BtcPk) -> Result<StoredEotsKey> {
        let bytes = self
            .db
            .get_cf(cf::EOTS_KEYS, &Self::pk_key(btc_pk))?
            .ok_or_else(|| EotsManagerError::KeyNotFound(hex::encode(btc_pk)))?;
        bincode::deserialize(&bytes)
            .map_err(|e| EotsManagerError::Store(StoreError::Serialization(e.to_string())))
    }

    fn unlock_key(&self, btc_pk: &BtcPk, passphrase: &str) -> Result<SchnorrSecretKey> {
        let stored = self.load_stored_key(btc_pk)?;
        if stored.passphrase_tag != Self::passphrase_tag(passphrase, btc_pk) {
            return Err(EotsManagerError::InvalidPassphrase(stored.name));
        }
        Ok(SchnorrSecretKey::from_bytes(&stored.secret_key)?)
    }
}

#[async_trait]
impl EotsManager for LocalEotsManager {
    async fn create_key(&self, name: &str, passphrase: &str, hd_path: &str) -> Result<BtcPk> {
        let _guard = self.write_lock.lock();

        if self.db.get_cf(cf::EOTS_KEYS, &Self::name_key(name))?.is_some() {
            return Err(EotsManagerError::KeyAlreadyExists(name.to_string()));
        }

        let sk = SchnorrSecretKey::generate(&mut OsRng);
        let btc_pk = sk.public_key().to_bytes();

        let stored = StoredEotsKey {
            name: name.to_string(),
            secret_key: sk.to_bytes(),
            passphrase_tag: Self::passphrase_tag(passphrase, &btc_pk),
            hd_path: hd_path.to_string(),
        };
        let bytes = bincode::serialize(&stored)
            .map_err(|e| EotsManagerError::Store(StoreError::Serialization(e.to_string())))?;

        self.db.put_cf(cf::EOTS_KEYS, &Self::pk_key(&btc_pk), &bytes)?;
        self.db.put_cf(cf::EOTS_KEYS, &Self::name_key(name), &btc_pk)?;

        info!(name = name, btc_pk = %hex::encode(btc_pk), "created EOTS key");
        Ok(btc_pk)
    }

    async fn key_record(&self, btc_pk: &BtcPk, passphrase: &str) -> Result<KeyRecord> {
        let stored = self.load_stored_key(btc_pk)?;
        if stored.passphrase_tag != Self::passphrase_tag(passphrase, btc_pk) {
            return Err(EotsManagerError::InvalidPassphrase(stored.name));
        }
        Ok(KeyRecord {
            name: stored.name,
            secret_key: stored.secret_key,
        })
    }

    async fn sign_schnorr(
        &self,
        btc_pk: &BtcPk,
        msg_hash: &[u8; 32],
        passphrase: &str,
    ) -> Result<SchnorrSignature> {
        let sk = self.unlock_key(btc_pk, passphrase)?;
        Ok(sk.sign(msg_hash))
    }

    async fn create_randomness_pair_list(
        &self,
        btc_pk: &BtcPk,
        chain_id: &str,
        start_height: u64,
        num: u64,
    ) -> Result<Vec<[u8; 32]>> {
        // Public randomness is not secret; derivation reads the stored key
        // without the passphrase gate.
        let stored = self.load_stored_key(btc_pk)?;
        let sk = SchnorrSecretKey::from_bytes(&stored.secret_key)?;

        let list = (0..num)
            .map(|i| {
                let r = eots::derive_sec_rand(&sk, chain_id.as_bytes(), start_height + i);
                eots::pub_rand_bytes(&r)
            })
            .collect();
        Ok(list)
    }

    async fn sign_eots(
        &self,
        btc_pk: &BtcPk,
        chain_id: &str,
        msg_hash: &[u8; 32],
        height: u64,
        passphrase: &str,
    ) -> Result<[u8; 32]> {
        let sk = self.unlock_key(btc_pk, passphrase)?;

        let _guard = self.write_lock.lock();

        let record_key = Self::sign_record_key(chain_id, btc_pk, height);
        if let Some(bytes) = self.db.get_cf(cf::EOTS_SIGN_RECORDS, &record_key)? {
            let record: SignRecord = bincode::deserialize(&bytes)
                .map_err(|e| EotsManagerError::Store(StoreError::Serialization(e.to_string())))?;
            if record.msg_hash != *msg_hash {
                warn!(
                    chain_id = chain_id,
                    height = height,
                    btc_pk = %hex::encode(btc_pk),
                    "refusing to sign a second message at an already-signed height"
                );
                return Err(EotsManagerError::DoubleSign {
                    chain_id: chain_id.to_string(),
                    height,
                });
            }
            // Same message: signing is deterministic, fall through and re-derive.
        } else {
            let record = SignRecord { msg_hash: *msg_hash };
            let bytes = bincode::serialize(&record)
                .map_err(|e| EotsManagerError::Store(StoreError::Serialization(e.to_string())))?;
            self.db.put_cf(cf::EOTS_SIGN_RECORDS, &record_key, &bytes)?;
        }

        let r = eots::derive_sec_rand(&sk, chain_id.as_bytes(), height);
        let sig = eots::sign(&sk, &r, msg_hash);
        Ok(sig.to_bytes().into())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
