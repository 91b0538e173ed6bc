//! RocksDB wrapper with column families acting as buckets.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options,
    WriteBatchWithTransaction, DB,
};
use tracing::info;

use crate::{Result, StoreError};

/// Column family names.
pub mod cf {
    /// Finality-provider records keyed by BTC public key
    pub const FINALITY_PROVIDERS: &str = "finality_providers";
    /// Public-randomness Merkle proofs keyed by `chain_id || btc_pk || be64(height)`
    pub const PUB_RAND_PROOFS: &str = "pub_rand_proofs";
    /// EOTS key records (local EOTS manager database only)
    pub const EOTS_KEYS: &str = "eots_keys";
    /// EOTS sign records preventing double-signing (local EOTS manager only)
    pub const EOTS_SIGN_RECORDS: &str = "eots_sign_records";
    /// Consumer-chain account keys
    pub const CHAIN_KEYS: &str = "chain_keys";
    /// Daemon metadata
    pub const METADATA: &str = "metadata";

    /// All column families
    pub const ALL: &[&str] = &[
        FINALITY_PROVIDERS,
        PUB_RAND_PROOFS,
        EOTS_KEYS,
        EOTS_SIGN_RECORDS,
        CHAIN_KEYS,
        METADATA,
    ];
}

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the database directory
    pub path: String,
    /// Enable LZ4 compression
    pub enable_compression: bool,
    /// Maximum number of open files
    pub max_open_files: i32,
    /// Write buffer size in bytes
    pub write_buffer_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: String::from("./data/fpd"),
            enable_compression: true,
            max_open_files: 256,
            write_buffer_size: 16 * 1024 * 1024,
        }
    }
}

/// Write batch for atomic multi-key operations.
pub struct WriteBatch {
    inner: WriteBatchWithTransaction<false>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self {
            inner: WriteBatchWithTransaction::default(),
        }
    }

    /// Queue a key-value write into a column family.
    pub fn put_cf(&mut self, cf: &Arc<BoundColumnFamily<'_>>, key: &[u8], value: &[u8]) {
        self.inner.put_cf(cf, key, value);
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

/// RocksDB wrapper shared by the stores.
///
/// The finality-provider stores and the local EOTS manager each open their
/// own `Database` at distinct paths; the column family set is common.
pub struct Database {
    inner: DBWithThreadMode<MultiThreaded>,
}

impl Database {
    /// Open or create a database at the configured path.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        info!(path = %config.path, "opening database");

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(config.max_open_files);
        opts.set_write_buffer_size(config.write_buffer_size);
        if config.enable_compression {
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        }

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = cf::ALL
            .iter()
            .map(|name| {
                let mut cf_opts = Options::default();
                if config.enable_compression {
                    cf_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
                }
                ColumnFamilyDescriptor::new(*name, cf_opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&opts, Path::new(&config.path), cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self { inner: db })
    }

    /// Open with default options at the given path.
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = DatabaseConfig {
            path: path.as_ref().to_string_lossy().into_owned(),
            ..Default::default()
        };
        Self::open(&config)
    }

    /// Handle to a column family.
    pub fn cf_handle(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.inner
            .cf_handle(name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(name.to_string()))
    }

    /// Read a value from a column family.
    pub fn get_cf(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(cf_name)?;
        self.inner
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Write a value into a column family.
    pub fn put_cf(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.cf_handle(cf_name)?;
        self.inner
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Delete a key from a column family.
    pub fn delete_cf(&self, cf_name: &str, key: &[u8]) -> Result<()> {
        let cf = self.cf_handle(cf_name)?;
        self.inner
            .delete_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Apply a write batch atomically.
    pub fn write(&self, batch: WriteBatch) -> Result<()> {
        self.inner
            .write(batch.inner)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Collect every `(key, value)` pair in a column family.
    pub fn scan_cf(&self, cf_name: &str) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf_handle(cf_name)?;
        self.inner
            .iterator_cf(&cf, rocksdb::IteratorMode::Start)
            .map(|item| item.map_err(|e| StoreError::Database(e.to_string())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_put_get_delete() {
        let dir = tempdir().unwrap();
        let db = Database::open_at(dir.path().join("db")).unwrap();

        db.put_cf(cf::METADATA, b"k", b"v").unwrap();
        assert_eq!(db.get_cf(cf::METADATA, b"k").unwrap().unwrap(), b"v");

        db.delete_cf(cf::METADATA, b"k").unwrap();
        assert!(db.get_cf(cf::METADATA, b"k").unwrap().is_none());
    }

    #[test]
    fn batch_is_atomic_per_write() {
        let dir = tempdir().unwrap();
        let db = Database::open_at(dir.path().join("db")).unwrap();

        let cf = db.cf_handle(cf::PUB_RAND_PROOFS).unwrap();
        let mut batch = WriteBatch::new();
        batch.put_cf(&cf, b"a", b"1");
        batch.put_cf(&cf, b"b", b"2");
        assert_eq!(batch.len(), 2);
        drop(cf);
        db.write(batch).unwrap();

        assert_eq!(db.get_cf(cf::PUB_RAND_PROOFS, b"a").unwrap().unwrap(), b"1");
        assert_eq!(db.get_cf(cf::PUB_RAND_PROOFS, b"b").unwrap().unwrap(), b"2");
    }

    #[test]
    fn scan_returns_all_entries() {
        let dir = tempdir().unwrap();
        let db = Database::open_at(dir.path().join("db")).unwrap();

        db.put_cf(cf::FINALITY_PROVIDERS, b"k1", b"v1").unwrap();
        db.put_cf(cf::FINALITY_PROVIDERS, b"k2", b"v2").unwrap();

        let entries = db.scan_cf(cf::FINALITY_PROVIDERS).unwrap();
        assert_eq!(entries.len(), 2);
    }
}
