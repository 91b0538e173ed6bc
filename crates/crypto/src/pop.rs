//! Proof-of-possession binding a BTC key to a chain account address.
//!
//! `btc_sig = BIP340_sign(sk_btc, SHA256(fp_addr bytes))`. Verification
//! parses the signature as BIP-340 and checks it against the x-only key.

use serde::{Deserialize, Serialize};

use crate::schnorr::{SchnorrPublicKey, SchnorrSignature};
use crate::{sha256, CryptoError, Result};

/// Signature encoding used inside a proof-of-possession.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopSigType {
    /// 64-byte BIP-340 Schnorr signature
    Bip340,
}

/// Proof that the holder of a BTC key controls a chain account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfPossession {
    /// Signature by the BTC key over the hashed account address
    pub btc_sig: SchnorrSignature,
    /// Encoding of `btc_sig`
    pub btc_sig_type: PopSigType,
}

impl ProofOfPossession {
    /// Wrap a BIP-340 signature produced over [`pop_msg_hash`].
    pub fn new_bip340(btc_sig: SchnorrSignature) -> Self {
        Self {
            btc_sig,
            btc_sig_type: PopSigType::Bip340,
        }
    }

    /// Verify this proof against the x-only BTC key and account address.
    pub fn verify(&self, btc_pk: &[u8; 32], fp_addr: &str) -> Result<()> {
        let pk = SchnorrPublicKey::from_bytes(btc_pk)?;
        let msg = pop_msg_hash(fp_addr);
        if pk.verify(&msg, &self.btc_sig) {
            Ok(())
        } else {
            Err(CryptoError::VerificationFailed)
        }
    }
}

/// The message a proof-of-possession signs: `SHA256(fp_addr bytes)`.
pub fn pop_msg_hash(fp_addr: &str) -> [u8; 32] {
    sha256(fp_addr.as_bytes())
}
