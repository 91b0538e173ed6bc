//! Extractable one-time signatures (EOTS).
//!
//! An EOTS signature is the `s` scalar of a Schnorr signature whose nonce is
//! a pre-committed one-time randomness. Producing two signatures with the
//! same randomness over different messages leaks the secret key:
//!
//! ```text
//! s1 = r + c1*x,  s2 = r + c2*x   =>   x = (s1 - s2) / (c1 - c2)
//! ```

use k256::elliptic_curve::ops::{MulByGenerator, Reduce};
use k256::elliptic_curve::PrimeField;
use k256::{ProjectivePoint, Scalar, U256};
use sha2::Digest;

use crate::schnorr::{challenge, has_even_y, lift_x, point_x_bytes, SchnorrSecretKey};
use crate::{tagged_hash, CryptoError, Result};

const RANDOMNESS_TAG: &[u8] = b"fpd/eots-randomness";

/// Secret one-time randomness: a scalar on secp256k1.
pub type SecRand = Scalar;

/// An EOTS signature: the `s` scalar of the underlying Schnorr signature.
pub type EotsSignature = Scalar;

/// Parse a 32-byte slice into secret randomness.
pub fn new_sec_rand(bytes: &[u8]) -> Result<SecRand> {
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidInputLength(bytes.len()))?;
    Scalar::from_repr_vartime(array.into()).ok_or(CryptoError::SecretRandomnessParseFailed)
}

/// Parse a 32-byte slice into an EOTS signature scalar.
pub fn new_signature(bytes: &[u8]) -> Result<EotsSignature> {
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidInputLength(bytes.len()))?;
    Scalar::from_repr_vartime(array.into()).ok_or(CryptoError::SignatureParseFailed)
}

/// Derive the deterministic one-time randomness for `(sk, chain_id, height)`.
///
/// The derivation is a reduction of `H_tag(sk || chain_id || be64(height))`,
/// normalized so the public randomness point has even y. One `(sk, chain_id,
/// height)` triple can therefore never map to two different nonces.
pub fn derive_sec_rand(sk: &SchnorrSecretKey, chain_id: &[u8], height: u64) -> SecRand {
    let r = <Scalar as Reduce<U256>>::reduce_bytes(
        &tagged_hash(RANDOMNESS_TAG)
            .chain_update(sk.to_bytes())
            .chain_update(chain_id)
            .chain_update(height.to_be_bytes())
            .finalize(),
    );
    let r = if r.is_zero().into() { Scalar::ONE } else { r };
    normalize_sec_rand(r)
}

/// Negate the randomness if its public point has odd y, so that verifiers
/// can lift the committed x-coordinate unambiguously.
pub fn normalize_sec_rand(r: SecRand) -> SecRand {
    let r_point = ProjectivePoint::mul_by_generator(&r);
    if has_even_y(&r_point) {
        r
    } else {
        -r
    }
}

/// The 32-byte public randomness (x-coordinate of `r*G`).
pub fn pub_rand_bytes(r: &SecRand) -> [u8; 32] {
    point_x_bytes(&ProjectivePoint::mul_by_generator(r))
}

/// Sign a 32-byte message hash with the given one-time randomness.
pub fn sign(sk: &SchnorrSecretKey, sec_rand: &SecRand, msg_hash: &[u8; 32]) -> EotsSignature {
    let pub_rand = pub_rand_bytes(sec_rand);
    let c = challenge(&pub_rand, &sk.public_key().to_bytes(), msg_hash);
    *sec_rand + c * sk.scalar()
}

/// Verify an EOTS signature against the committed public randomness.
pub fn verify(
    pk_bytes: &[u8; 32],
    pub_rand: &[u8; 32],
    msg_hash: &[u8; 32],
    sig: &EotsSignature,
) -> Result<()> {
    let pk_point = lift_x(pk_bytes)?;
    let r_point = lift_x(pub_rand).map_err(|_| CryptoError::PublicRandomnessParseFailed)?;
    let c = challenge(pub_rand, pk_bytes, msg_hash);

    if ProjectivePoint::mul_by_generator(sig) == r_point + pk_point * c {
        Ok(())
    } else {
        Err(CryptoError::VerificationFailed)
    }
}

/// Extract the secret key from two signatures under the same randomness.
///
/// This is the cryptoeconomic teeth of the protocol: a finality provider
/// that double-signs at a height hands out its BTC-locked secret key.
pub fn extract(
    pk_bytes: &[u8; 32],
    pub_rand: &[u8; 32],
    msg_hash_1: &[u8; 32],
    sig_1: &EotsSignature,
    msg_hash_2: &[u8; 32],
    sig_2: &EotsSignature,
) -> Result<[u8; 32]> {
    let c1 = challenge(pub_rand, pk_bytes, msg_hash_1);
    let c2 = challenge(pub_rand, pk_bytes, msg_hash_2);

    let denom = c1 - c2;
    let denom_inv = Option::<Scalar>::from(denom.invert())
        .ok_or_else(|| CryptoError::ExtractionFailed("identical challenges".into()))?;
    let x = (*sig_1 - *sig_2) * denom_inv;

    // The extracted scalar must reproduce the claimed public key
    let point = ProjectivePoint::mul_by_generator(&x);
    if point_x_bytes(&point) != *pk_bytes {
        return Err(CryptoError::ExtractionFailed(
            "extracted key does not match public key".into(),
        ));
    }
    Ok(x.to_bytes().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sha256;
    use rand::rngs::OsRng;

    #[test]
    fn sign_verify_roundtrip() {
        let sk = SchnorrSecretKey::generate(&mut OsRng);
        let r = derive_sec_rand(&sk, b"chain-test", 102);
        let pub_rand = pub_rand_bytes(&r);

        let msg = sha256(b"block hash at 102");
        let sig = sign(&sk, &r, &msg);

        verify(&sk.public_key().to_bytes(), &pub_rand, &msg, &sig).unwrap();

        let wrong = sha256(b"another block hash");
        assert_eq!(
            verify(&sk.public_key().to_bytes(), &pub_rand, &wrong, &sig),
            Err(CryptoError::VerificationFailed)
        );
    }

    #[test]
    fn derivation_is_deterministic_and_height_scoped() {
        let sk = SchnorrSecretKey::generate(&mut OsRng);
        let a = derive_sec_rand(&sk, b"chain-test", 7);
        let b = derive_sec_rand(&sk, b"chain-test", 7);
        let c = derive_sec_rand(&sk, b"chain-test", 8);
        let d = derive_sec_rand(&sk, b"other-chain", 7);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn double_sign_extracts_secret_key() {
        let sk = SchnorrSecretKey::generate(&mut OsRng);
        let pk = sk.public_key().to_bytes();
        let r = derive_sec_rand(&sk, b"chain-test", 42);
        let pub_rand = pub_rand_bytes(&r);

        let msg1 = sha256(b"block A");
        let msg2 = sha256(b"block B");
        let sig1 = sign(&sk, &r, &msg1);
        let sig2 = sign(&sk, &r, &msg2);

        let extracted = extract(&pk, &pub_rand, &msg1, &sig1, &msg2, &sig2).unwrap();
        assert_eq!(extracted, sk.to_bytes());
    }

    #[test]
    fn extraction_rejects_same_message() {
        let sk = SchnorrSecretKey::generate(&mut OsRng);
        let pk = sk.public_key().to_bytes();
        let r = derive_sec_rand(&sk, b"chain-test", 42);
        let pub_rand = pub_rand_bytes(&r);

        let msg = sha256(b"block A");
        let sig = sign(&sk, &r, &msg);
        assert!(extract(&pk, &pub_rand, &msg, &sig, &msg, &sig).is_err());
    }

    #[test]
    fn scalar_parse_rejects_bad_length() {
        assert!(new_sec_rand(&[0u8; 31]).is_err());
        assert!(new_signature(&[0u8; 33]).is_err());
    }
}
