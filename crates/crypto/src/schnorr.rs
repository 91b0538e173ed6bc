//! BIP-340 style Schnorr signatures over secp256k1.
//!
//! Public keys are 32-byte x-only coordinates; the point with even
//! y-coordinate is implied. Secret keys are normalized at construction so
//! that their public point has even y, which keeps signing free of parity
//! fix-ups.

use k256::elliptic_curve::ops::{MulByGenerator, Reduce};
use k256::elliptic_curve::point::DecompressPoint;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::subtle::Choice;
use k256::elliptic_curve::PrimeField;
use k256::{AffinePoint, ProjectivePoint, Scalar, U256};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Digest;

use crate::{tagged_hash, CryptoError, Result};

const CHALLENGE_TAG: &[u8] = b"BIP0340/challenge";
const NONCE_TAG: &[u8] = b"BIP0340/nonce";

/// Extract the 32-byte x-coordinate of a (non-identity) point.
pub(crate) fn point_x_bytes(p: &ProjectivePoint) -> [u8; 32] {
    let encoded = p.to_affine().to_encoded_point(true);
    // x() is only None for the identity, which signing can never produce
    let x = encoded.x().expect("non-identity point");
    let mut out = [0u8; 32];
    out.copy_from_slice(x.as_slice());
    out
}

/// Whether the point's affine y-coordinate is even.
pub(crate) fn has_even_y(p: &ProjectivePoint) -> bool {
    let encoded = p.to_affine().to_encoded_point(true);
    encoded.as_bytes()[0] == 0x02
}

/// Lift a 32-byte x-coordinate to the curve point with even y.
pub(crate) fn lift_x(x_bytes: &[u8; 32]) -> Result<ProjectivePoint> {
    let x = k256::FieldBytes::from(*x_bytes);
    let ap = AffinePoint::decompress(&x, Choice::from(0));
    if ap.is_some().into() {
        Ok(ProjectivePoint::from(ap.unwrap()))
    } else {
        Err(CryptoError::PublicKeyParseFailed)
    }
}

/// The BIP-340 challenge scalar `e = H_tag(R_x || P_x || m)`.
pub(crate) fn challenge(r_x: &[u8; 32], pk_x: &[u8; 32], msg: &[u8]) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(
        &tagged_hash(CHALLENGE_TAG)
            .chain_update(r_x)
            .chain_update(pk_x)
            .chain_update(msg)
            .finalize(),
    )
}

/// Schnorr secret key, normalized so the public point has even y.
#[derive(Clone)]
pub struct SchnorrSecretKey {
    scalar: Scalar,
    public: SchnorrPublicKey,
}

/// Schnorr public key: an x-only 32-byte coordinate with the even-y point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchnorrPublicKey {
    point: ProjectivePoint,
    bytes: [u8; 32],
}

/// Schnorr signature (64 bytes: `R_x || s`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchnorrSignature {
    /// Commitment point R, x-coordinate only
    pub r: [u8; 32],
    /// Response scalar s
    pub s: [u8; 32],
}

impl SchnorrSecretKey {
    /// Generate a fresh random key.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        loop {
            let mut seed = [0u8; 32];
            rng.fill_bytes(&mut seed);
            if let Ok(sk) = Self::from_bytes(&seed) {
                return sk;
            }
        }
    }

    /// Parse from raw scalar bytes. The scalar must be non-zero.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let scalar = Scalar::from_repr_vartime((*bytes).into())
            .ok_or(CryptoError::SecretKeyParseFailed)?;
        if scalar.is_zero().into() {
            return Err(CryptoError::SecretKeyParseFailed);
        }

        // Normalize to the even-y representative of the key pair
        let point = ProjectivePoint::mul_by_generator(&scalar);
        let scalar = if has_even_y(&point) { scalar } else { -scalar };
        let point = ProjectivePoint::mul_by_generator(&scalar);
        let bytes = point_x_bytes(&point);

        Ok(Self {
            scalar,
            public: SchnorrPublicKey { point, bytes },
        })
    }

    /// The corresponding public key.
    pub fn public_key(&self) -> &SchnorrPublicKey {
        &self.public
    }

    /// The normalized secret scalar bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.scalar.to_bytes().into()
    }

    /// The secret scalar (even-y normalized).
    pub(crate) fn scalar(&self) -> &Scalar {
        &self.scalar
    }

    /// Sign a 32-byte message hash.
    pub fn sign(&self, msg_hash: &[u8; 32]) -> SchnorrSignature {
        let k = self.nonce(msg_hash);
        let r_point = ProjectivePoint::mul_by_generator(&k);
        let k = if has_even_y(&r_point) { k } else { -k };
        let r = point_x_bytes(&r_point);

        let e = challenge(&r, &self.public.bytes, msg_hash);
        let s = k + e * self.scalar;

        SchnorrSignature { r, s: s.to_bytes().into() }
    }

    /// Deterministic nonce derivation in the BIP-340 tagged-hash style.
    fn nonce(&self, msg_hash: &[u8; 32]) -> Scalar {
        let k = <Scalar as Reduce<U256>>::reduce_bytes(
            &tagged_hash(NONCE_TAG)
                .chain_update(self.scalar.to_bytes())
                .chain_update(self.public.bytes)
                .chain_update(msg_hash)
                .finalize(),
        );
        if k.is_zero().into() {
            Scalar::ONE
        } else {
            k
        }
    }
}

impl SchnorrPublicKey {
    /// Parse from a 32-byte x-only coordinate.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let point = lift_x(bytes)?;
        Ok(Self { point, bytes: *bytes })
    }

    /// The x-only bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.bytes
    }

    /// Verify a signature over a 32-byte message hash.
    pub fn verify(&self, msg_hash: &[u8; 32], signature: &SchnorrSignature) -> bool {
        let s = match Scalar::from_repr_vartime(signature.s.into()) {
            Some(s) => s,
            None => return false,
        };
        let r_point = match lift_x(&signature.r) {
            Ok(p) => p,
            Err(_) => return false,
        };

        let e = challenge(&signature.r, &self.bytes, msg_hash);

        // s*G == R + e*P, with R constrained to even y by construction
        ProjectivePoint::mul_by_generator(&s) == r_point + self.point * e
    }
}

impl SchnorrSignature {
    /// Parse from 64 raw bytes (`R_x || s`).
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[0..32]);
        s.copy_from_slice(&bytes[32..64]);
        Self { r, s }
    }

    /// Serialize to 64 raw bytes.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[0..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn sign_and_verify() {
        let sk = SchnorrSecretKey::generate(&mut OsRng);
        let pk = sk.public_key();

        let msg = crate::sha256(b"finality vote");
        let sig = sk.sign(&msg);
        assert!(pk.verify(&msg, &sig));

        let other = crate::sha256(b"another vote");
        assert!(!pk.verify(&other, &sig));
    }

    #[test]
    fn verify_rejects_mangled_sig() {
        let sk = SchnorrSecretKey::generate(&mut OsRng);
        let msg = crate::sha256(b"payload");
        let mut sig = sk.sign(&msg);
        sig.s[0] ^= 0xff;
        assert!(!sk.public_key().verify(&msg, &sig));
    }

    #[test]
    fn public_key_roundtrip() {
        let sk = SchnorrSecretKey::generate(&mut OsRng);
        let bytes = sk.public_key().to_bytes();
        let parsed = SchnorrPublicKey::from_bytes(&bytes).unwrap();
        assert_eq!(&parsed, sk.public_key());
    }

    #[test]
    fn signature_byte_roundtrip() {
        let sk = SchnorrSecretKey::generate(&mut OsRng);
        let msg = crate::sha256(b"bytes");
        let sig = sk.sign(&msg);
        assert_eq!(SchnorrSignature::from_bytes(&sig.to_bytes()), sig);
    }

    #[test]
    fn zero_secret_key_rejected() {
        assert!(SchnorrSecretKey::from_bytes(&[0u8; 32]).is_err());
    }
}
