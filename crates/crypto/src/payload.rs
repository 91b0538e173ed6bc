//! Canonical sign-payloads exchanged with the consumer chain.

use crate::sha256;

/// Payload signed when committing a public-randomness batch:
/// `chain_id || be64(start_height) || be64(num) || root`.
pub fn commit_pub_rand_payload(
    chain_id: &str,
    start_height: u64,
    num_pub_rand: u64,
    commitment: &[u8; 32],
) -> Vec<u8> {
    let id = chain_id.as_bytes();
    let mut payload = Vec::with_capacity(id.len() + 8 + 8 + 32);
    payload.extend_from_slice(id);
    payload.extend_from_slice(&start_height.to_be_bytes());
    payload.extend_from_slice(&num_pub_rand.to_be_bytes());
    payload.extend_from_slice(commitment);
    payload
}

/// The 32-byte message hash an EOTS finality vote signs:
/// `SHA256(chain_id || be64(height) || block_hash)`.
pub fn finality_vote_msg_hash(chain_id: &str, height: u64, block_hash: &[u8; 32]) -> [u8; 32] {
    let id = chain_id.as_bytes();
    let mut msg = Vec::with_capacity(id.len() + 8 + 32);
    msg.extend_from_slice(id);
    msg.extend_from_slice(&height.to_be_bytes());
    msg.extend_from_slice(block_hash);
    sha256(&msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_payload_layout() {
        let payload = commit_pub_rand_payload("chain-test", 101, 3, &[0xaa; 32]);
        assert_eq!(payload.len(), 10 + 8 + 8 + 32);
        assert_eq!(&payload[..10], b"chain-test");
        assert_eq!(&payload[10..18], &101u64.to_be_bytes());
        assert_eq!(&payload[18..26], &3u64.to_be_bytes());
        assert_eq!(&payload[26..], &[0xaa; 32]);
    }

    #[test]
    fn vote_msg_depends_on_all_inputs() {
        let base = finality_vote_msg_hash("chain-test", 102, &[0xab; 32]);
        assert_ne!(base, finality_vote_msg_hash("chain-test", 103, &[0xab; 32]));
        assert_ne!(base, finality_vote_msg_hash("chain-test", 102, &[0xcd; 32]));
        assert_ne!(base, finality_vote_msg_hash("other", 102, &[0xab; 32]));
        assert_eq!(base, finality_vote_msg_hash("chain-test", 102, &[0xab; 32]));
    }
}
