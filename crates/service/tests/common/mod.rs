//! Shared test fixtures: an in-memory mock chain and a registered
//! finality-provider environment.

// Each test binary compiles this module independently and uses a subset
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tempfile::TempDir;
use tokio::sync::mpsc;

use fp_clientcontroller::{ClientController, ClientError, Result as ClientResult};
use fp_config::Config;
use fp_crypto::pop::pop_msg_hash;
use fp_crypto::{MerkleProof, ProofOfPossession, SchnorrSignature};
use fp_eotsmanager::{EotsManager, LocalEotsManager};
use fp_service::{CriticalError, FinalityProviderInstance, FpMetrics};
use fp_store::{Database, FinalityProviderStore, PubRandProofStore};
use fp_types::{
    BlockInfo, BtcPk, CommissionRate, Description, FinalityProviderStatus, PubRandCommit,
    TxResponse,
};

pub const PASSPHRASE: &str = "test-passphrase";
pub const HD_PATH: &str = "m/84'/1'/0'/0/0";
pub const CHAIN_ID: &str = "chain-test";
pub const TX_HASH: &str = "0xabc123";

/// A recorded `commit_pub_rand_list` call.
#[derive(Debug, Clone)]
pub struct CommitCall {
    pub start_height: u64,
    pub num_pub_rand: u64,
    pub commitment: [u8; 32],
}

/// A recorded `submit_batch_finality_sigs` call.
#[derive(Debug, Clone)]
pub struct BatchCall {
    pub blocks: Vec<BlockInfo>,
    pub pub_rands: Vec<[u8; 32]>,
    pub sig_count: usize,
}

/// Scriptable in-memory consumer chain.
#[derive(Default)]
pub struct MockChain {
    pub best_height: RwLock<u64>,
    pub activated_height: RwLock<u64>,
    pub finality_activation: RwLock<u64>,
    pub default_voting_power: RwLock<u64>,
    pub voting_power_overrides: RwLock<HashMap<u64, u64>>,
    pub slashed: RwLock<bool>,
    pub jailed: RwLock<bool>,
    pub last_committed: RwLock<Vec<PubRandCommit>>,
    pub commit_calls: Mutex<Vec<CommitCall>>,
    pub batch_calls: Mutex<Vec<BatchCall>>,
    pub register_calls: Mutex<u64>,
    pub unjail_calls: Mutex<u64>,
    pub submit_error: RwLock<Option<ClientError>>,
    pub commit_error: RwLock<Option<ClientError>>,
}

impl MockChain {
    pub fn new() -> Self {
        let chain = Self::default();
        *chain.best_height.write() = 100;
        *chain.activated_height.write() = 1;
        *chain.finality_activation.write() = 1;
        chain
    }

    pub fn block_at(height: u64) -> BlockInfo {
        BlockInfo {
            height,
            hash: [height as u8; 32],
        }
    }

    pub fn set_voting_power(&self, height: u64, power: u64) {
        self.voting_power_overrides.write().insert(height, power);
    }

    pub fn set_default_voting_power(&self, power: u64) {
        *self.default_voting_power.write() = power;
    }

    pub fn commit_call_count(&self) -> usize {
        self.commit_calls.lock().len()
    }

    pub fn batch_call_count(&self) -> usize {
        self.batch_calls.lock().len()
    }
}

#[async_trait]
impl ClientController for MockChain {
    async fn query_best_block(&self) -> ClientResult<BlockInfo> {
        Ok(Self::block_at(*self.best_height.read()))
    }

    async fn query_block(&self, height: u64) -> ClientResult<BlockInfo> {
        Ok(Self::block_at(height))
    }

    async fn query_activated_height(&self) -> ClientResult<u64> {
        Ok(*self.activated_height.read())
    }

    async fn query_finality_activation_block_height(&self) -> ClientResult<u64> {
        Ok(*self.finality_activation.read())
    }

    async fn query_finality_provider_voting_power(
        &self,
        _btc_pk: &BtcPk,
        height: u64,
    ) -> ClientResult<u64> {
        Ok(self
            .voting_power_overrides
            .read()
            .get(&height)
            .copied()
            .unwrap_or(*self.default_voting_power.read()))
    }

    async fn query_finality_provider_slashed_or_jailed(
        &self,
        _btc_pk: &BtcPk,
    ) -> ClientResult<(bool, bool)> {
        Ok((*self.slashed.read(), *self.jailed.read()))
    }

    async fn query_last_committed_public_rand(
        &self,
        _btc_pk: &BtcPk,
        count: u64,
    ) -> ClientResult<Vec<PubRandCommit>> {
        let commits = self.last_committed.read();
        let skip = commits.len().saturating_sub(count as usize);
        Ok(commits[skip..].to_vec())
    }

    async fn query_latest_finalized_blocks(&self, _count: u64) -> ClientResult<Vec<BlockInfo>> {
        Ok(vec![])
    }

    async fn register_finality_provider(
        &self,
        _btc_pk: &BtcPk,
        _pop: &ProofOfPossession,
        _commission: CommissionRate,
        _description: &Description,
    ) -> ClientResult<TxResponse> {
        *self.register_calls.lock() += 1;
        Ok(TxResponse::new(TX_HASH))
    }

    async fn commit_pub_rand_list(
        &self,
        _btc_pk: &BtcPk,
        start_height: u64,
        num_pub_rand: u64,
        commitment: &[u8; 32],
        _sig: &SchnorrSignature,
    ) -> ClientResult<TxResponse> {
        if let Some(err) = self.commit_error.read().clone() {
            return Err(err);
        }
        self.commit_calls.lock().push(CommitCall {
            start_height,
            num_pub_rand,
            commitment: *commitment,
        });
        self.last_committed.write().push(PubRandCommit {
            start_height,
            num_pub_rand,
            commitment: *commitment,
        });
        Ok(TxResponse::new(TX_HASH))
    }

    async fn submit_finality_sig(
        &self,
        btc_pk: &BtcPk,
        block: &BlockInfo,
        proof: &MerkleProof,
        pub_rand: &[u8; 32],
        sig: &[u8; 32],
    ) -> ClientResult<TxResponse> {
        self.submit_batch_finality_sigs(
            btc_pk,
            std::slice::from_ref(block),
            std::slice::from_ref(proof),
            std::slice::from_ref(pub_rand),
            std::slice::from_ref(sig),
        )
        .await
    }

    async fn submit_batch_finality_sigs(
        &self,
        _btc_pk: &BtcPk,
        blocks: &[BlockInfo],
        _proofs: &[MerkleProof],
        pub_rands: &[[u8; 32]],
        sigs: &[[u8; 32]],
    ) -> ClientResult<TxResponse> {
        if let Some(err) = self.submit_error.read().clone() {
            return Err(err);
        }
        self.batch_calls.lock().push(BatchCall {
            blocks: blocks.to_vec(),
            pub_rands: pub_rands.to_vec(),
            sig_count: sigs.len(),
        });
        Ok(TxResponse::new(TX_HASH))
    }

    async fn unjail_finality_provider(&self, _btc_pk: &BtcPk) -> ClientResult<TxResponse> {
        *self.unjail_calls.lock() += 1;
        Ok(TxResponse::new("0xde4d"))
    }

    async fn close(&self) -> ClientResult<()> {
        Ok(())
    }
}

/// A test environment with one registered finality provider.
pub struct TestEnv {
    pub _fp_dir: TempDir,
    pub _eots_dir: TempDir,
    pub config: Arc<Config>,
    pub db: Arc<Database>,
    pub fp_store: Arc<FinalityProviderStore>,
    pub pub_rand_store: Arc<PubRandProofStore>,
    pub em: Arc<LocalEotsManager>,
    pub chain: Arc<MockChain>,
    pub btc_pk: BtcPk,
}

/// Test config: a 3-value randomness batch and fast loop intervals.
pub fn test_config(fp_path: &std::path::Path, eots_path: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.chain.chain_id = CHAIN_ID.to_string();
    config.db.path = fp_path.to_string_lossy().into_owned();
    config.eots.db_path = eots_path.to_string_lossy().into_owned();
    config.randomness.num_pub_rand = 3;
    config.randomness.min_rand_height_gap = 3;
    config.submission.batch_size = 10;
    config.submission.max_retries = 2;
    config.submission.retry_interval_ms = 20;
    config.poller.poll_interval_ms = 25;
    config.poller.static_start_height = Some(101);
    config.timing.status_update_interval_ms = 25;
    config.timing.sync_fp_status_interval_ms = 25;
    config.timing.randomness_commit_interval_ms = 50;
    config.metrics.update_interval_ms = 50;
    config
}

/// Build an environment holding one provider in `Registered` status.
pub async fn registered_fp_env() -> TestEnv {
    let fp_dir = tempfile::tempdir().unwrap();
    let eots_dir = tempfile::tempdir().unwrap();

    let config = Arc::new(test_config(
        &fp_dir.path().join("db"),
        &eots_dir.path().join("db"),
    ));
    let db = Arc::new(Database::open_at(&config.db.path).unwrap());
    let eots_db = Arc::new(Database::open_at(&config.eots.db_path).unwrap());

    let fp_store = Arc::new(FinalityProviderStore::new(Arc::clone(&db)));
    let pub_rand_store = Arc::new(PubRandProofStore::new(Arc::clone(&db)));
    let em = Arc::new(LocalEotsManager::new(eots_db));
    let chain = Arc::new(MockChain::new());

    let btc_pk = em.create_key("test-key", PASSPHRASE, HD_PATH).await.unwrap();
    let addr = "fp1qpzry9x8gf2tvdw0s3jn54khce6mua7l";
    let pop_sig = em
        .sign_schnorr(&btc_pk, &pop_msg_hash(addr), PASSPHRASE)
        .await
        .unwrap();

    fp_store
        .create_finality_provider(
            addr,
            &btc_pk,
            Description::with_moniker("test-fp"),
            CommissionRate::zero(),
            "test-key",
            CHAIN_ID,
            ProofOfPossession::new_bip340(pop_sig),
        )
        .unwrap();
    fp_store
        .set_status(&btc_pk, FinalityProviderStatus::Registered)
        .unwrap();

    TestEnv {
        _fp_dir: fp_dir,
        _eots_dir: eots_dir,
        config,
        db,
        fp_store,
        pub_rand_store,
        em,
        chain,
        btc_pk,
    }
}

impl TestEnv {
    /// Build an instance over this environment.
    pub fn make_instance(
        &self,
    ) -> (Arc<FinalityProviderInstance>, mpsc::Receiver<CriticalError>) {
        let (crit_tx, crit_rx) = mpsc::channel(1);
        let instance = Arc::new(
            FinalityProviderInstance::new(
                self.btc_pk,
                Arc::clone(&self.config),
                Arc::clone(&self.fp_store),
                Arc::clone(&self.pub_rand_store),
                self.chain.clone() as Arc<dyn ClientController>,
                self.em.clone() as Arc<dyn EotsManager>,
                Arc::new(FpMetrics::new()),
                PASSPHRASE,
                crit_tx,
            )
            .unwrap(),
        );
        (instance, crit_rx)
    }
}

/// Poll until the predicate holds or the timeout elapses.
pub async fn wait_until<F: Fn() -> bool>(what: &str, predicate: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !predicate() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
