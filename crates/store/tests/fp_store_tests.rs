//! Integration tests for the finality-provider store.

use std::sync::Arc;

use rand::rngs::OsRng;
use tempfile::tempdir;

use fp_crypto::pop::pop_msg_hash;
use fp_crypto::{ProofOfPossession, SchnorrSecretKey};
use fp_store::{Database, FinalityProviderStore, StoreError};
use fp_types::{CommissionRate, Description, FinalityProviderStatus};

struct Fixture {
    _dir: tempfile::TempDir,
    store: FinalityProviderStore,
    btc_pk: [u8; 32],
}

fn fixture() -> Fixture {
    let dir = tempdir().unwrap();
    let db = Arc::new(Database::open_at(dir.path().join("db")).unwrap());
    let store = FinalityProviderStore::new(db);

    let sk = SchnorrSecretKey::generate(&mut OsRng);
    let btc_pk = sk.public_key().to_bytes();
    let addr = "fp1qpzry9x8gf2tvdw0s3jn54khce6mua7l";
    let pop = ProofOfPossession::new_bip340(sk.sign(&pop_msg_hash(addr)));

    store
        .create_finality_provider(
            addr,
            &btc_pk,
            Description::with_moniker("test-fp"),
            CommissionRate::zero(),
            "test-key",
            "chain-test",
            pop,
        )
        .unwrap();

    Fixture {
        _dir: dir,
        store,
        btc_pk,
    }
}

#[test]
fn create_and_get_roundtrip() {
    let f = fixture();
    let fp = f.store.get_finality_provider(&f.btc_pk).unwrap();

    assert_eq!(fp.btc_pk, f.btc_pk);
    assert_eq!(fp.chain_id, "chain-test");
    assert_eq!(fp.status, FinalityProviderStatus::Created);
    assert_eq!(fp.last_voted_height, 0);
    fp.pop.verify(&fp.btc_pk, &fp.fp_addr).unwrap();
}

#[test]
fn duplicate_create_rejected_record_intact() {
    let f = fixture();
    let original = f.store.get_finality_provider(&f.btc_pk).unwrap();

    let err = f
        .store
        .create_finality_provider(
            "fp1aaaaaaaaaaaaaaa",
            &f.btc_pk,
            Description::with_moniker("imposter"),
            CommissionRate::zero(),
            "other-key",
            "chain-test",
            original.pop.clone(),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateFinalityProvider(_)));

    // The first record survives untouched
    let after = f.store.get_finality_provider(&f.btc_pk).unwrap();
    assert_eq!(after, original);
}

#[test]
fn status_transitions_follow_graph() {
    let f = fixture();
    let s = &f.store;

    s.set_status(&f.btc_pk, FinalityProviderStatus::Registered)
        .unwrap();
    assert_eq!(
        s.update_status_from_voting_power(&f.btc_pk, 1).unwrap(),
        FinalityProviderStatus::Active
    );
    assert_eq!(
        s.update_status_from_voting_power(&f.btc_pk, 0).unwrap(),
        FinalityProviderStatus::Inactive
    );
    assert_eq!(
        s.update_status_from_voting_power(&f.btc_pk, 2).unwrap(),
        FinalityProviderStatus::Active
    );

    // Registered with zero power stays Registered
    s.set_status(&f.btc_pk, FinalityProviderStatus::Registered)
        .unwrap();
    assert_eq!(
        s.update_status_from_voting_power(&f.btc_pk, 0).unwrap(),
        FinalityProviderStatus::Registered
    );
}

#[test]
fn slashed_is_absorbing() {
    let f = fixture();
    let s = &f.store;

    s.set_status(&f.btc_pk, FinalityProviderStatus::Slashed)
        .unwrap();

    let err = s
        .set_status(&f.btc_pk, FinalityProviderStatus::Active)
        .unwrap_err();
    assert!(matches!(err, StoreError::SlashedIsTerminal(_)));

    // Voting power cannot resurrect a slashed provider
    assert_eq!(
        s.update_status_from_voting_power(&f.btc_pk, 1).unwrap(),
        FinalityProviderStatus::Slashed
    );
    assert_eq!(
        s.get_finality_provider(&f.btc_pk).unwrap().status,
        FinalityProviderStatus::Slashed
    );
}

#[test]
fn last_voted_height_is_monotonic() {
    let f = fixture();
    let s = &f.store;

    s.set_last_voted_height(&f.btc_pk, 102).unwrap();
    assert_eq!(
        s.get_finality_provider(&f.btc_pk).unwrap().last_voted_height,
        102
    );

    // Equal height is a no-op
    s.set_last_voted_height(&f.btc_pk, 102).unwrap();

    // Regression is refused
    let err = s.set_last_voted_height(&f.btc_pk, 101).unwrap_err();
    assert!(matches!(
        err,
        StoreError::NonMonotonicVotedHeight { stored: 102, new: 101, .. }
    ));
    assert_eq!(
        s.get_finality_provider(&f.btc_pk).unwrap().last_voted_height,
        102
    );
}

#[test]
fn list_all_providers() {
    let f = fixture();
    let all = f.store.get_all_finality_providers().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].btc_pk, f.btc_pk);
}

#[test]
fn missing_provider_is_not_found() {
    let f = fixture();
    let err = f.store.get_finality_provider(&[9u8; 32]).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}
