//! Consumer-chain block view and transaction responses.

use serde::{Deserialize, Serialize};

/// The daemon's minimal view of a consumer-chain block.
///
/// Block hashes are identity tokens; they are never validated beyond their
/// byte length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Block height
    pub height: u64,
    /// 32-byte block hash
    pub hash: [u8; 32],
}

impl BlockInfo {
    /// Create a new block view.
    pub fn new(height: u64, hash: [u8; 32]) -> Self {
        Self { height, hash }
    }
}

/// Response to a successful chain submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResponse {
    /// Hash of the accepted transaction
    pub tx_hash: String,
}

impl TxResponse {
    /// Wrap a transaction hash.
    pub fn new(tx_hash: impl Into<String>) -> Self {
        Self {
            tx_hash: tx_hash.into(),
        }
    }
}
