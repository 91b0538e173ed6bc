//! Integration tests for the local EOTS manager.

use std::sync::Arc;

use tempfile::tempdir;

use fp_crypto::{eots, payload, SchnorrPublicKey};
use fp_eotsmanager::{EotsManager, EotsManagerError, LocalEotsManager};
use fp_store::Database;

const PASSPHRASE: &str = "test-passphrase";
const HD_PATH: &str = "m/84'/1'/0'/0/0";

fn new_manager() -> (tempfile::TempDir, LocalEotsManager) {
    let dir = tempdir().unwrap();
    let db = Arc::new(Database::open_at(dir.path().join("eots-db")).unwrap());
    (dir, LocalEotsManager::new(db))
}

#[tokio::test]
async fn create_key_and_duplicate_name() {
    let (_dir, em) = new_manager();

    let pk = em.create_key("my-key", PASSPHRASE, HD_PATH).await.unwrap();
    assert!(SchnorrPublicKey::from_bytes(&pk).is_ok());

    let err = em.create_key("my-key", PASSPHRASE, HD_PATH).await.unwrap_err();
    assert!(matches!(err, EotsManagerError::KeyAlreadyExists(_)));
}

#[tokio::test]
async fn key_record_requires_passphrase() {
    let (_dir, em) = new_manager();
    let pk = em.create_key("k", PASSPHRASE, HD_PATH).await.unwrap();

    let record = em.key_record(&pk, PASSPHRASE).await.unwrap();
    assert_eq!(record.name, "k");

    let err = em.key_record(&pk, "wrong").await.unwrap_err();
    assert!(matches!(err, EotsManagerError::InvalidPassphrase(_)));
}

#[tokio::test]
async fn schnorr_signature_verifies() {
    let (_dir, em) = new_manager();
    let pk = em.create_key("k", PASSPHRASE, HD_PATH).await.unwrap();

    let msg = fp_crypto::sha256(b"proof of possession payload");
    let sig = em.sign_schnorr(&pk, &msg, PASSPHRASE).await.unwrap();

    let public = SchnorrPublicKey::from_bytes(&pk).unwrap();
    assert!(public.verify(&msg, &sig));
}

#[tokio::test]
async fn randomness_list_is_deterministic() {
    let (_dir, em) = new_manager();
    let pk = em.create_key("k", PASSPHRASE, HD_PATH).await.unwrap();

    let a = em
        .create_randomness_pair_list(&pk, "chain-test", 101, 3)
        .await
        .unwrap();
    let b = em
        .create_randomness_pair_list(&pk, "chain-test", 101, 3)
        .await
        .unwrap();
    assert_eq!(a.len(), 3);
    assert_eq!(a, b);

    // Overlapping windows agree on shared heights
    let c = em
        .create_randomness_pair_list(&pk, "chain-test", 102, 3)
        .await
        .unwrap();
    assert_eq!(a[1], c[0]);
    assert_eq!(a[2], c[1]);

    // Other chains get unrelated randomness
    let d = em
        .create_randomness_pair_list(&pk, "other-chain", 101, 3)
        .await
        .unwrap();
    assert_ne!(a, d);
}

#[tokio::test]
async fn eots_signature_verifies_against_committed_randomness() {
    let (_dir, em) = new_manager();
    let pk = em.create_key("k", PASSPHRASE, HD_PATH).await.unwrap();

    let height = 102u64;
    let pub_rand = em
        .create_randomness_pair_list(&pk, "chain-test", height, 1)
        .await
        .unwrap()[0];

    let msg = payload::finality_vote_msg_hash("chain-test", height, &[0xab; 32]);
    let sig_bytes = em
        .sign_eots(&pk, "chain-test", &msg, height, PASSPHRASE)
        .await
        .unwrap();

    let sig = eots::new_signature(&sig_bytes).unwrap();
    eots::verify(&pk, &pub_rand, &msg, &sig).unwrap();
}

#[tokio::test]
async fn double_sign_is_refused_and_same_msg_is_idempotent() {
    let (_dir, em) = new_manager();
    let pk = em.create_key("k", PASSPHRASE, HD_PATH).await.unwrap();

    let height = 102u64;
    let msg_a = payload::finality_vote_msg_hash("chain-test", height, &[0xab; 32]);
    let msg_b = payload::finality_vote_msg_hash("chain-test", height, &[0xcd; 32]);

    let first = em
        .sign_eots(&pk, "chain-test", &msg_a, height, PASSPHRASE)
        .await
        .unwrap();

    // Same message: deterministic re-sign
    let again = em
        .sign_eots(&pk, "chain-test", &msg_a, height, PASSPHRASE)
        .await
        .unwrap();
    assert_eq!(first, again);

    // Different message at the same height: refused
    let err = em
        .sign_eots(&pk, "chain-test", &msg_b, height, PASSPHRASE)
        .await
        .unwrap_err();
    assert!(err.is_double_sign());

    // Same height on a different chain is a separate one-time slot
    em.sign_eots(&pk, "other-chain", &msg_b, height, PASSPHRASE)
        .await
        .unwrap();
}

#[tokio::test]
async fn forced_double_sign_would_extract_the_key() {
    // End-to-end statement of the cryptoeconomic property: if the sign
    // record were bypassed, two votes at one height reveal the secret key.
    let (_dir, em) = new_manager();
    let pk = em.create_key("k", PASSPHRASE, HD_PATH).await.unwrap();
    let record = em.key_record(&pk, PASSPHRASE).await.unwrap();

    let sk = fp_crypto::SchnorrSecretKey::from_bytes(&record.secret_key).unwrap();
    let r = eots::derive_sec_rand(&sk, b"chain-test", 42);
    let pub_rand = eots::pub_rand_bytes(&r);

    let msg1 = payload::finality_vote_msg_hash("chain-test", 42, &[0x01; 32]);
    let msg2 = payload::finality_vote_msg_hash("chain-test", 42, &[0x02; 32]);
    let sig1 = eots::sign(&sk, &r, &msg1);
    let sig2 = eots::sign(&sk, &r, &msg2);

    let extracted = eots::extract(&pk, &pub_rand, &msg1, &sig1, &msg2, &sig2).unwrap();
    assert_eq!(extracted, record.secret_key);
}
