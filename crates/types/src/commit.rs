//! On-chain public-randomness commitment descriptor.

use serde::{Deserialize, Serialize};

/// A public-randomness commitment observed on-chain.
///
/// Covers the half-open height range `[start_height, start_height + num_pub_rand)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubRandCommit {
    /// First height the commitment covers
    pub start_height: u64,
    /// Number of public randomness values in the batch
    pub num_pub_rand: u64,
    /// Merkle root over the batch
    pub commitment: [u8; 32],
}

impl PubRandCommit {
    /// The first height NOT covered by this commitment.
    pub fn end_height(&self) -> u64 {
        self.start_height + self.num_pub_rand
    }

    /// Whether the given height falls inside the committed range.
    pub fn covers(&self, height: u64) -> bool {
        height >= self.start_height && height < self.end_height()
    }
}
