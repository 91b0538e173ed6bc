//! RFC-6962 Merkle trees over public-randomness batches.
//!
//! Leaf and inner nodes are domain-separated (`0x00`/`0x01` prefixes) and
//! the tree splits at the largest power of two smaller than the length.
//! Proof aunts are ordered leaf-to-root.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{CryptoError, Result};

const LEAF_PREFIX: u8 = 0;
const INNER_PREFIX: u8 = 1;

/// Hash of the empty tree.
pub fn empty_hash() -> Vec<u8> {
    Sha256::digest([]).to_vec()
}

/// RFC-6962 leaf hash: `SHA256(0x00 || leaf)`.
pub fn leaf_hash(leaf: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(leaf);
    hasher.finalize().to_vec()
}

/// RFC-6962 inner hash: `SHA256(0x01 || left || right)`.
pub fn inner_hash(left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update([INNER_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().to_vec()
}

/// The largest power of two strictly less than `length`.
fn get_split_point(length: u64) -> Result<u64> {
    if length < 1 {
        return Err(CryptoError::Merkle(
            "trying to split a tree with size < 1".into(),
        ));
    }
    let bit_len = (length as usize).next_power_of_two().trailing_zeros();
    let k = 1u64 << bit_len.saturating_sub(1);
    if k == length {
        Ok(k >> 1)
    } else {
        Ok(k)
    }
}

/// Compute the Merkle root over the leaves in order.
pub fn root_from_leaves(items: &[Vec<u8>]) -> Vec<u8> {
    match items.len() {
        0 => empty_hash(),
        1 => leaf_hash(&items[0]),
        n => {
            let k = get_split_point(n as u64).expect("n >= 2") as usize;
            let left = root_from_leaves(&items[..k]);
            let right = root_from_leaves(&items[k..]);
            inner_hash(&left, &right)
        }
    }
}

/// A proof of a leaf's existence in a Merkle tree.
///
/// The proof carries the leaf hash but not the root; `aunts` run from the
/// leaf's sibling up to the root's child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Number of leaves in the tree
    pub total: u64,
    /// Index of the proven leaf
    pub index: u64,
    /// Hash of the proven leaf
    pub leaf_hash: Vec<u8>,
    /// Sibling hashes, leaf-to-root order
    pub aunts: Vec<Vec<u8>>,
}

impl Proof {
    /// Upper bound on proof depth; a tree this deep would be astronomically large.
    pub const MAX_AUNTS: usize = 100;

    /// Basic well-formedness checks on hash sizes and proof depth.
    pub fn validate_basic(&self) -> Result<()> {
        if self.leaf_hash.len() != Sha256::output_size() {
            return Err(CryptoError::Merkle(format!(
                "expected leaf_hash size {}, got {}",
                Sha256::output_size(),
                self.leaf_hash.len()
            )));
        }
        if self.aunts.len() > Self::MAX_AUNTS {
            return Err(CryptoError::Merkle(format!(
                "expected no more than {} aunts, got {}",
                Self::MAX_AUNTS,
                self.aunts.len()
            )));
        }
        for (i, aunt) in self.aunts.iter().enumerate() {
            if aunt.len() != Sha256::output_size() {
                return Err(CryptoError::Merkle(format!(
                    "expected aunt #{i} size {}, got {}",
                    Sha256::output_size(),
                    aunt.len()
                )));
            }
        }
        Ok(())
    }

    /// Verify that this proof ties `leaf` to `root_hash`.
    pub fn verify(&self, root_hash: &[u8], leaf: &[u8]) -> Result<()> {
        if root_hash.is_empty() {
            return Err(CryptoError::Merkle("root hash cannot be empty".into()));
        }
        self.validate_basic()?;
        if self.leaf_hash != leaf_hash(leaf) {
            return Err(CryptoError::Merkle("leaf hash mismatch".into()));
        }
        let computed = self.compute_root_hash()?;
        if computed != root_hash {
            return Err(CryptoError::Merkle("root hash mismatch".into()));
        }
        Ok(())
    }

    /// Recompute the root implied by this proof.
    pub fn compute_root_hash(&self) -> Result<Vec<u8>> {
        compute_hash_from_aunts(self.index, self.total, &self.leaf_hash, &self.aunts)
    }
}

fn compute_hash_from_aunts(
    index: u64,
    total: u64,
    leaf_hash: &[u8],
    inner_hashes: &[Vec<u8>],
) -> Result<Vec<u8>> {
    if total == 0 || index >= total {
        return Err(CryptoError::Merkle(format!(
            "invalid index ({index}) and/or total ({total})"
        )));
    }
    match total {
        1 => {
            if !inner_hashes.is_empty() {
                return Err(CryptoError::Merkle("unexpected inner hashes".into()));
            }
            Ok(leaf_hash.to_vec())
        }
        _ => {
            if inner_hashes.is_empty() {
                return Err(CryptoError::Merkle("expected at least one inner hash".into()));
            }
            let num_left = get_split_point(total)?;
            let (top, rest) = inner_hashes.split_last().expect("checked non-empty");
            if index < num_left {
                let left = compute_hash_from_aunts(index, num_left, leaf_hash, rest)?;
                Ok(inner_hash(&left, top))
            } else {
                let right =
                    compute_hash_from_aunts(index - num_left, total - num_left, leaf_hash, rest)?;
                Ok(inner_hash(top, &right))
            }
        }
    }
}

/// Compute the root and all per-leaf inclusion proofs in one pass.
///
/// The randomness-commit pipeline persists every proof before the root is
/// broadcast, so batch generation is the only construction path.
pub fn proofs_from_leaves(items: &[Vec<u8>]) -> (Vec<u8>, Vec<Proof>) {
    let total = items.len() as u64;
    let (root, trails) = build_trails(items);
    let proofs = trails
        .into_iter()
        .enumerate()
        .map(|(i, aunts)| Proof {
            total,
            index: i as u64,
            leaf_hash: leaf_hash(&items[i]),
            aunts,
        })
        .collect();
    (root, proofs)
}

/// Returns the subtree root and, per leaf, its aunts in leaf-to-root order.
fn build_trails(items: &[Vec<u8>]) -> (Vec<u8>, Vec<Vec<Vec<u8>>>) {
    match items.len() {
        0 => (empty_hash(), vec![]),
        1 => (leaf_hash(&items[0]), vec![vec![]]),
        n => {
            let k = get_split_point(n as u64).expect("n >= 2") as usize;
            let (left_root, mut left_trails) = build_trails(&items[..k]);
            let (right_root, mut right_trails) = build_trails(&items[k..]);
            for trail in &mut left_trails {
                trail.push(right_root.clone());
            }
            for trail in &mut right_trails {
                trail.push(left_root.clone());
            }
            left_trails.append(&mut right_trails);
            (inner_hash(&left_root, &right_root), left_trails)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_point() {
        let tests = [
            (1, 0),
            (2, 1),
            (3, 2),
            (4, 2),
            (5, 4),
            (10, 8),
            (20, 16),
            (100, 64),
            (255, 128),
            (256, 128),
            (257, 256),
        ];
        for (length, want) in tests {
            assert_eq!(get_split_point(length).unwrap(), want);
        }
        assert!(get_split_point(0).is_err());
    }

    #[test]
    fn single_leaf_tree() {
        let items = vec![b"foo".to_vec()];
        let (root, proofs) = proofs_from_leaves(&items);
        assert_eq!(root, leaf_hash(b"foo"));
        assert_eq!(proofs.len(), 1);
        proofs[0].verify(&root, b"foo").unwrap();
    }

    #[test]
    fn all_proofs_verify() {
        for n in [2usize, 3, 4, 5, 7, 8, 13] {
            let items: Vec<Vec<u8>> = (0..n).map(|i| vec![i as u8; 32]).collect();
            let (root, proofs) = proofs_from_leaves(&items);
            assert_eq!(root, root_from_leaves(&items));
            assert_eq!(proofs.len(), n);
            for (i, proof) in proofs.iter().enumerate() {
                assert_eq!(proof.index, i as u64);
                assert_eq!(proof.total, n as u64);
                proof.verify(&root, &items[i]).unwrap();
            }
        }
    }

    #[test]
    fn proof_rejects_wrong_leaf_and_root() {
        let items: Vec<Vec<u8>> = (0..4u8).map(|i| vec![i; 32]).collect();
        let (root, proofs) = proofs_from_leaves(&items);

        assert!(proofs[1].verify(&root, &items[2]).is_err());
        assert!(proofs[1].verify(&leaf_hash(b"bogus"), &items[1]).is_err());
        assert!(proofs[1].verify(&[], &items[1]).is_err());
    }

    #[test]
    fn validate_basic_bounds() {
        let proof = Proof {
            total: 1,
            index: 0,
            leaf_hash: vec![0; 31],
            aunts: vec![],
        };
        assert!(proof.validate_basic().is_err());

        let proof = Proof {
            total: 1,
            index: 0,
            leaf_hash: vec![0; 32],
            aunts: vec![vec![0; 32]; Proof::MAX_AUNTS + 1],
        };
        assert!(proof.validate_basic().is_err());
    }
}
