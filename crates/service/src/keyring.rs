//! Consumer-chain account keyring.
//!
//! Holds the secp256k1 account keys the daemon registers under. Addresses
//! are bech32 with the chain's human-readable prefix over the first 20
//! bytes of `SHA256(compressed pubkey)`.

use std::sync::Arc;

use bech32::{Bech32, Hrp};
use k256::ecdsa::signature::Signer;
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use fp_store::db::cf;
use fp_store::{Database, StoreError};

/// Result alias for keyring operations.
pub type Result<T> = std::result::Result<T, KeyringError>;

/// Keyring error types.
#[derive(Debug, thiserror::Error)]
pub enum KeyringError {
    /// A key with this name already exists
    #[error("chain key already exists: {0}")]
    KeyAlreadyExists(String),

    /// No key under this name
    #[error("chain key not found: {0}")]
    KeyNotFound(String),

    /// Invalid address prefix
    #[error("invalid address prefix: {0}")]
    InvalidPrefix(String),

    /// Storage failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Public information about a chain key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainKeyInfo {
    /// Keyring alias
    pub name: String,
    /// Bech32 account address
    pub address: String,
    /// SEC1-compressed public key
    pub public_key: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct StoredChainKey {
    name: String,
    secret_key: Vec<u8>,
    address: String,
}

/// Store-backed keyring for consumer-chain account keys.
pub struct ChainKeyring {
    db: Arc<Database>,
    address_prefix: String,
    write_lock: Mutex<()>,
}

impl ChainKeyring {
    /// Create a keyring over the daemon database.
    pub fn new(db: Arc<Database>, address_prefix: &str) -> Self {
        Self {
            db,
            address_prefix: address_prefix.to_string(),
            write_lock: Mutex::new(()),
        }
    }

    /// Derive the bech32 account address of a public key.
    pub fn address_of(&self, verifying_key: &VerifyingKey) -> Result<String> {
        let compressed = verifying_key.to_encoded_point(true);
        let digest: [u8; 32] = Sha256::digest(compressed.as_bytes()).into();
        let hrp = Hrp::parse(&self.address_prefix)
            .map_err(|e| KeyringError::InvalidPrefix(e.to_string()))?;
        bech32::encode::<Bech32>(hrp, &digest[..20])
            .map_err(|e| KeyringError::InvalidPrefix(e.to_string()))
    }

    /// Generate and persist a new account key under the given alias.
    pub fn create_chain_key(&self, name: &str) -> Result<ChainKeyInfo> {
        let _guard = self.write_lock.lock();

        if self.db.get_cf(cf::CHAIN_KEYS, name.as_bytes())?.is_some() {
            return Err(KeyringError::KeyAlreadyExists(name.to_string()));
        }

        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        let address = self.address_of(verifying_key)?;

        let stored = StoredChainKey {
            name: name.to_string(),
            secret_key: signing_key.to_bytes().to_vec(),
            address: address.clone(),
        };
        let bytes = bincode::serialize(&stored)
            .map_err(|e| KeyringError::Store(StoreError::Serialization(e.to_string())))?;
        self.db.put_cf(cf::CHAIN_KEYS, name.as_bytes(), &bytes)?;

        info!(name = name, address = %address, "created chain account key");
        Ok(ChainKeyInfo {
            name: name.to_string(),
            address,
            public_key: verifying_key.to_encoded_point(true).as_bytes().to_vec(),
        })
    }

    /// Look up the account address stored under an alias.
    pub fn address(&self, name: &str) -> Result<String> {
        Ok(self.load(name)?.address)
    }

    /// List every stored chain key.
    pub fn list(&self) -> Result<Vec<ChainKeyInfo>> {
        self.db
            .scan_cf(cf::CHAIN_KEYS)?
            .into_iter()
            .map(|(_, value)| {
                let stored: StoredChainKey = bincode::deserialize(&value)
                    .map_err(|e| KeyringError::Store(StoreError::Serialization(e.to_string())))?;
                let signing_key = SigningKey::from_slice(&stored.secret_key)
                    .map_err(|e| KeyringError::Store(StoreError::Serialization(e.to_string())))?;
                Ok(ChainKeyInfo {
                    name: stored.name,
                    address: stored.address,
                    public_key: signing_key
                        .verifying_key()
                        .to_encoded_point(true)
                        .as_bytes()
                        .to_vec(),
                })
            })
            .collect()
    }

    /// ECDSA-sign a raw message with the named account key.
    pub fn sign(&self, name: &str, msg: &[u8]) -> Result<Vec<u8>> {
        let stored = self.load(name)?;
        let signing_key = SigningKey::from_slice(&stored.secret_key)
            .map_err(|e| KeyringError::Store(StoreError::Serialization(e.to_string())))?;
        let signature: Signature = signing_key.sign(msg);
        Ok(signature.to_vec())
    }

    fn load(&self, name: &str) -> Result<StoredChainKey> {
        let bytes = self
            .db
            .get_cf(cf::CHAIN_KEYS, name.as_bytes())?
            .ok_or_else(|| KeyringError::KeyNotFound(name.to_string()))?;
        bincode::deserialize(&bytes)
            .map_err(|e| KeyringError::Store(StoreError::Serialization(e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn keyring() -> (tempfile::TempDir, ChainKeyring) {
        let dir = tempdir().unwrap();
        let db = Arc::new(Database::open_at(dir.path().join("db")).unwrap());
        (dir, ChainKeyring::new(db, "fp"))
    }

    #[test]
    fn create_lookup_and_duplicate() {
        let (_dir, kr) = keyring();

        let info = kr.create_chain_key("validator-key").unwrap();
        assert!(info.address.starts_with("fp1"));
        fp_types::validate_account_address(&info.address).unwrap();

        assert_eq!(kr.address("validator-key").unwrap(), info.address);
        assert!(matches!(
            kr.create_chain_key("validator-key"),
            Err(KeyringError::KeyAlreadyExists(_))
        ));
        assert!(matches!(
            kr.address("missing"),
            Err(KeyringError::KeyNotFound(_))
        ));
    }

    #[test]
    fn list_and_sign() {
        let (_dir, kr) = keyring();
        kr.create_chain_key("a").unwrap();
        kr.create_chain_key("b").unwrap();

        let listed = kr.list().unwrap();
        assert_eq!(listed.len(), 2);

        let sig = kr.sign("a", b"raw message").unwrap();
        assert!(!sig.is_empty());
    }
}
