//! Integration tests for the app orchestrator: create, register, unjail
//! and chain status sync.

mod common;

use std::sync::Arc;

use common::{registered_fp_env, wait_until, TestEnv, CHAIN_ID, HD_PATH, PASSPHRASE, TX_HASH};

use fp_clientcontroller::ClientController;
use fp_eotsmanager::EotsManager;
use fp_service::{AppError, FinalityProviderApp};
use fp_types::{BtcPk, CommissionRate, Description, FinalityProviderStatus};

fn make_app(env: &TestEnv) -> Arc<FinalityProviderApp> {
    Arc::new(FinalityProviderApp::new(
        Arc::clone(&env.config),
        Arc::clone(&env.db),
        env.chain.clone() as Arc<dyn ClientController>,
        env.em.clone() as Arc<dyn EotsManager>,
    ))
}

/// Create a fresh EOTS key + chain key pair through the app's keyring.
async fn new_key_pair(app: &FinalityProviderApp, env: &TestEnv, name: &str) -> BtcPk {
    app.keyring().create_chain_key(name).unwrap();
    env.em.create_key(name, PASSPHRASE, HD_PATH).await.unwrap()
}

#[tokio::test]
async fn create_finality_provider_roundtrip() {
    let env = registered_fp_env().await;
    let app = make_app(&env);
    app.start().unwrap();

    let eots_pk = new_key_pair(&app, &env, "alice").await;
    let info = app
        .create_finality_provider(
            "alice",
            CHAIN_ID,
            PASSPHRASE,
            eots_pk,
            Description::with_moniker("alice-fp"),
            "0.05".parse::<CommissionRate>().unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(info.btc_pk_hex, hex::encode(eots_pk));
    assert_eq!(info.status, FinalityProviderStatus::Created);
    assert_eq!(info.last_voted_height, 0);

    // The persisted proof-of-possession binds the key to the address
    let stored = app.fp_store().get_finality_provider(&eots_pk).unwrap();
    stored.pop.verify(&eots_pk, &stored.fp_addr).unwrap();
    assert_eq!(stored.commission.bps(), 500);

    app.stop().await.unwrap();
}

#[tokio::test]
async fn duplicate_create_returns_error_and_keeps_first_record() {
    let env = registered_fp_env().await;
    let app = make_app(&env);
    app.start().unwrap();

    let eots_pk = new_key_pair(&app, &env, "bob").await;
    let description = Description::with_moniker("bob-fp");
    app.create_finality_provider(
        "bob",
        CHAIN_ID,
        PASSPHRASE,
        eots_pk,
        description.clone(),
        CommissionRate::zero(),
    )
    .await
    .unwrap();

    let err = app
        .create_finality_provider(
            "bob",
            CHAIN_ID,
            PASSPHRASE,
            eots_pk,
            Description::with_moniker("imposter"),
            CommissionRate::zero(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Store(_)));

    let stored = app.fp_store().get_finality_provider(&eots_pk).unwrap();
    assert_eq!(stored.description, description);

    app.stop().await.unwrap();
}

#[tokio::test]
async fn create_requires_existing_chain_key() {
    let env = registered_fp_env().await;
    let app = make_app(&env);
    app.start().unwrap();

    let eots_pk = env.em.create_key("loner", PASSPHRASE, HD_PATH).await.unwrap();
    let err = app
        .create_finality_provider(
            "loner",
            CHAIN_ID,
            PASSPHRASE,
            eots_pk,
            Description::default(),
            CommissionRate::zero(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Keyring(_)));

    app.stop().await.unwrap();
}

#[tokio::test]
async fn register_sets_durable_status_before_replying() {
    let env = registered_fp_env().await;
    let app = make_app(&env);
    app.start().unwrap();

    let eots_pk = new_key_pair(&app, &env, "carol").await;
    app.create_finality_provider(
        "carol",
        CHAIN_ID,
        PASSPHRASE,
        eots_pk,
        Description::with_moniker("carol-fp"),
        CommissionRate::zero(),
    )
    .await
    .unwrap();

    let res = app.register_finality_provider(&eots_pk).await.unwrap();
    assert_eq!(res.tx_hash, TX_HASH);
    assert_eq!(res.btc_pk, eots_pk);

    // The reply implies the durable transition already happened
    assert_eq!(
        app.fp_store().get_finality_provider(&eots_pk).unwrap().status,
        FinalityProviderStatus::Registered
    );

    // Registering twice is refused up front
    let err = app.register_finality_provider(&eots_pk).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyRegistered { .. }));

    app.stop().await.unwrap();
}

#[tokio::test]
async fn unjail_transitions_to_inactive() {
    let env = registered_fp_env().await;
    let app = make_app(&env);
    app.start().unwrap();

    app.fp_store()
        .set_status(&env.btc_pk, FinalityProviderStatus::Jailed)
        .unwrap();

    let tx_hash = app.unjail_finality_provider(&env.btc_pk).await.unwrap();
    assert_eq!(tx_hash, "0xde4d");
    assert_eq!(*env.chain.unjail_calls.lock(), 1);
    assert_eq!(
        app.fp_store().get_finality_provider(&env.btc_pk).unwrap().status,
        FinalityProviderStatus::Inactive
    );

    // The usual promotion applies once power is observed again, whether by
    // the app's sync loop or the started instance's own status loop
    env.chain.set_default_voting_power(1);
    let running = app.sync_finality_provider_status().await.unwrap();
    assert!(running);
    let store = Arc::clone(app.fp_store());
    let pk = env.btc_pk;
    wait_until("promotion to ACTIVE", || {
        store.get_finality_provider(&pk).unwrap().status == FinalityProviderStatus::Active
    })
    .await;

    app.stop().await.unwrap();
}

#[tokio::test]
async fn sync_starts_an_eligible_instance() {
    let env = registered_fp_env().await;
    let app = make_app(&env);
    app.start().unwrap();

    env.chain.set_default_voting_power(1);
    wait_until("instance started by sync loop", || {
        app.manager().is_finality_provider_running(&env.btc_pk)
    })
    .await;

    let store = Arc::clone(app.fp_store());
    let pk = env.btc_pk;
    wait_until("promotion to ACTIVE", || {
        store.get_finality_provider(&pk).unwrap().status == FinalityProviderStatus::Active
    })
    .await;

    app.stop().await.unwrap();
}

#[tokio::test]
async fn sync_observes_slashing_as_terminal() {
    let env = registered_fp_env().await;
    let app = make_app(&env);

    env.chain.set_default_voting_power(0);
    *env.chain.slashed.write() = true;
    let running = app.sync_finality_provider_status().await.unwrap();
    assert!(!running);
    assert_eq!(
        app.fp_store().get_finality_provider(&env.btc_pk).unwrap().status,
        FinalityProviderStatus::Slashed
    );

    // A healthy follow-up observation must not re-activate
    *env.chain.slashed.write() = false;
    env.chain.set_default_voting_power(1);
    let running = app.sync_finality_provider_status().await.unwrap();
    assert!(!running);
    assert_eq!(
        app.fp_store().get_finality_provider(&env.btc_pk).unwrap().status,
        FinalityProviderStatus::Slashed
    );
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let env = registered_fp_env().await;
    let app = make_app(&env);

    app.start().unwrap();
    app.start().unwrap();
    app.stop().await.unwrap();
    app.stop().await.unwrap();

    // Requests after shutdown fail cleanly instead of hanging
    let eots_pk = env.em.create_key("late", PASSPHRASE, HD_PATH).await.unwrap();
    let err = app
        .create_finality_provider(
            "late",
            CHAIN_ID,
            PASSPHRASE,
            eots_pk,
            Description::default(),
            CommissionRate::zero(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ShuttingDown));
}
