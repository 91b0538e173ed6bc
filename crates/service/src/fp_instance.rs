//! Per-provider instance: the actor that commits randomness, submits
//! finality signatures and tracks its own chain status.

use std::cmp;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use fp_clientcontroller::ClientController;
use fp_config::Config;
use fp_crypto::{merkle, payload, sha256, CryptoError};
use fp_eotsmanager::EotsManager;
use fp_store::{FinalityProviderStore, PubRandProofStore, StoreError};
use fp_types::{BlockInfo, BtcPk, FinalityProviderStatus, TxResponse};

use crate::metrics::FpMetrics;
use crate::poller::ChainPoller;
use crate::{CriticalError, InstanceError};

const STATE_NEW: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// How many recent commitments to ask for when only the latest matters.
const LAST_COMMITTED_QUERY_COUNT: u64 = 1;

/// A running finality provider.
///
/// Owns three cooperating tasks: the randomness-commit loop, the
/// finality-submission loop (fed by a [`ChainPoller`]) and the status-update
/// loop. All of them select on one quit signal; `start`/`stop` are
/// CAS-guarded and idempotent.
pub struct FinalityProviderInstance {
    btc_pk: BtcPk,
    chain_id: String,
    passphrase: String,
    config: Arc<Config>,
    fp_store: Arc<FinalityProviderStore>,
    pub_rand_store: Arc<PubRandProofStore>,
    cc: Arc<dyn ClientController>,
    em: Arc<dyn EotsManager>,
    metrics: Arc<FpMetrics>,

    status: RwLock<FinalityProviderStatus>,
    // Single writer: the submission loop. Other tasks only read.
    last_voted_height: AtomicU64,

    run_state: AtomicU8,
    quit: broadcast::Sender<()>,
    crit_tx: mpsc::Sender<CriticalError>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FinalityProviderInstance {
    /// Load the stored provider and build an instance for it.
    ///
    /// Fails when the stored status is not eligible to run (jailed,
    /// slashed, or not yet registered).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        btc_pk: BtcPk,
        config: Arc<Config>,
        fp_store: Arc<FinalityProviderStore>,
        pub_rand_store: Arc<PubRandProofStore>,
        cc: Arc<dyn ClientController>,
        em: Arc<dyn EotsManager>,
        metrics: Arc<FpMetrics>,
        passphrase: &str,
        crit_tx: mpsc::Sender<CriticalError>,
    ) -> Result<Self, InstanceError> {
        let fp = fp_store.get_finality_provider(&btc_pk)?;
        if !fp.should_start() {
            return Err(InstanceError::NotEligible(fp.status.to_string()));
        }

        let (quit, _) = broadcast::channel(1);
        Ok(Self {
            btc_pk,
            chain_id: fp.chain_id.clone(),
            passphrase: passphrase.to_string(),
            config,
            fp_store,
            pub_rand_store,
            cc,
            em,
            metrics,
            status: RwLock::new(fp.status),
            last_voted_height: AtomicU64::new(fp.last_voted_height),
            run_state: AtomicU8::new(STATE_NEW),
            quit,
            crit_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// The provider's BTC public key.
    pub fn btc_pk(&self) -> &BtcPk {
        &self.btc_pk
    }

    /// Hex rendering of the BTC public key.
    pub fn btc_pk_hex(&self) -> String {
        hex::encode(self.btc_pk)
    }

    /// The chain this instance signs for.
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// The cached lifecycle status.
    pub fn get_status(&self) -> FinalityProviderStatus {
        *self.status.read()
    }

    /// The cached highest voted height.
    pub fn get_last_voted_height(&self) -> u64 {
        self.last_voted_height.load(Ordering::Acquire)
    }

    /// Whether the instance's loops are live.
    pub fn is_running(&self) -> bool {
        self.run_state.load(Ordering::Acquire) == STATE_RUNNING
    }

    /// Spawn the instance's tasks. A second call is a no-op.
    pub async fn start(self: &Arc<Self>) -> Result<(), InstanceError> {
        if self
            .run_state
            .compare_exchange(STATE_NEW, STATE_RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let start_height = self.poller_start_height().await?;
        info!(
            btc_pk = %self.btc_pk_hex(),
            start_height = start_height,
            "starting finality provider instance"
        );

        let (poller, block_rx) = ChainPoller::new(
            Arc::clone(&self.cc),
            self.config.poller.clone(),
            start_height,
            self.quit.subscribe(),
        );

        let mut tasks = self.tasks.lock();
        tasks.push(poller.spawn());

        let this = Arc::clone(self);
        let quit = self.quit.subscribe();
        tasks.push(tokio::spawn(async move {
            this.randomness_loop(quit).await;
        }));

        let this = Arc::clone(self);
        let quit = self.quit.subscribe();
        tasks.push(tokio::spawn(async move {
            this.submission_loop(block_rx, quit).await;
        }));

        let this = Arc::clone(self);
        let quit = self.quit.subscribe();
        tasks.push(tokio::spawn(async move {
            this.status_loop(quit).await;
        }));

        Ok(())
    }

    /// Signal the quit channel and wait for every task to drain.
    /// Idempotent; persistent state is left untouched.
    pub async fn stop(&self) -> Result<(), InstanceError> {
        if self
            .run_state
            .compare_exchange(
                STATE_RUNNING,
                STATE_STOPPED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            info!(btc_pk = %self.btc_pk_hex(), "stopping finality provider instance");
            let _ = self.quit.send(());
        }

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "instance task ended abnormally");
            }
        }
        Ok(())
    }

    /// First height the poller should fetch: nothing below the finality
    /// activation height, an already-voted height, or a finalized block.
    async fn poller_start_height(&self) -> Result<u64, InstanceError> {
        if let Some(height) = self.config.poller.static_start_height {
            return Ok(height);
        }
        let activation = self.cc.query_finality_activation_block_height().await?;
        let last_finalized = self
            .cc
            .query_latest_finalized_blocks(1)
            .await?
            .first()
            .map(|b| b.height)
            .unwrap_or(0);
        Ok(cmp::max(
            self.get_last_voted_height() + 1,
            cmp::max(activation, last_finalized + 1),
        ))
    }

    // ==================== randomness-commit loop ====================

    async fn randomness_loop(&self, mut quit: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.timing.randomness_commit_interval());
        loop {
            tokio::select! {
                _ = quit.recv() => {
                    debug!(btc_pk = %self.btc_pk_hex(), "exiting randomness commit loop");
                    return;
                }
                _ = ticker.tick() => {
                    let tip = match self.cc.query_best_block().await {
                        Ok(tip) => tip,
                        Err(e) => {
                            warn!(error = %e, "failed to query best block for randomness commit");
                            continue;
                        }
                    };
                    match self.commit_pub_rand(tip.height).await {
                        Ok(Some(res)) => {
                            info!(
                                btc_pk = %self.btc_pk_hex(),
                                tx_hash = %res.tx_hash,
                                "committed public randomness"
                            );
                        }
                        Ok(None) => {}
                        Err(e) if e.is_critical() => {
                            self.escalate(e).await;
                            return;
                        }
                        Err(e) => warn!(error = %e, "public randomness commit failed"),
                    }
                }
            }
        }
    }

    /// Maintain the committed-randomness buffer against the chain tip.
    ///
    /// Returns `Ok(None)` when the buffer is still deep enough or a
    /// competing submitter won the race; `Ok(Some(tx))` after a commit.
    pub async fn commit_pub_rand(
        &self,
        tip_height: u64,
    ) -> Result<Option<TxResponse>, InstanceError> {
        let last_committed = self
            .cc
            .query_last_committed_public_rand(&self.btc_pk, LAST_COMMITTED_QUERY_COUNT)
            .await?
            .pop();

        let gap = self.config.randomness.min_rand_height_gap;
        let start_height = match last_committed {
            Some(commit) if commit.end_height() >= tip_height + gap => {
                // Enough committed-but-unconsumed randomness remains
                return Ok(None);
            }
            Some(commit) => commit.end_height(),
            None => {
                let activation = self.cc.query_activated_height().await?;
                cmp::max(activation, tip_height + 1)
            }
        };

        let num = self.config.randomness.num_pub_rand;
        let pub_rand_list = self
            .em
            .create_randomness_pair_list(&self.btc_pk, &self.chain_id, start_height, num)
            .await?;

        let leaves: Vec<Vec<u8>> = pub_rand_list.iter().map(|r| r.to_vec()).collect();
        let (root, proofs) = merkle::proofs_from_leaves(&leaves);
        let commitment: [u8; 32] = root
            .as_slice()
            .try_into()
            .map_err(|_| InstanceError::Crypto(CryptoError::Merkle("root is not 32 bytes".into())))?;

        // Proofs must be durable before the root leaves this process.
        self.pub_rand_store
            .add_pub_rand_proofs(&self.chain_id, &self.btc_pk, start_height, &proofs)?;

        let sign_payload =
            payload::commit_pub_rand_payload(&self.chain_id, start_height, num, &commitment);
        let sig = self
            .em
            .sign_schnorr(&self.btc_pk, &sha256(&sign_payload), &self.passphrase)
            .await?;

        match self
            .cc
            .commit_pub_rand_list(&self.btc_pk, start_height, num, &commitment, &sig)
            .await
        {
            Ok(res) => {
                self.metrics
                    .record_last_committed_rand_height(&self.btc_pk_hex(), start_height + num - 1);
                Ok(Some(res))
            }
            Err(e) if e.is_already_submitted() => {
                // A competing submitter won the race for this range; the next
                // tick re-reads the chain's view and continues from there.
                info!(
                    btc_pk = %self.btc_pk_hex(),
                    start_height = start_height,
                    "randomness range already committed"
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    // ==================== finality-submission loop ====================

    async fn submission_loop(
        &self,
        mut block_rx: mpsc::Receiver<BlockInfo>,
        mut quit: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = quit.recv() => {
                    debug!(btc_pk = %self.btc_pk_hex(), "exiting finality submission loop");
                    return;
                }
                block = block_rx.recv() => {
                    let Some(first) = block else {
                        debug!("block channel closed; exiting finality submission loop");
                        return;
                    };
                    let mut batch = vec![first];
                    while (batch.len() as u64) < self.config.submission.batch_size {
                        match block_rx.try_recv() {
                            Ok(block) => batch.push(block),
                            Err(_) => break,
                        }
                    }
                    if !self.submit_with_retries(&batch, &mut quit).await {
                        return;
                    }
                }
            }
        }
    }

    /// Drive one batch through submission with exponential backoff.
    /// Returns false when the loop must exit (quit or critical error).
    async fn submit_with_retries(
        &self,
        batch: &[BlockInfo],
        quit: &mut broadcast::Receiver<()>,
    ) -> bool {
        let max_retries = self.config.submission.max_retries;
        let mut delay = self.config.submission.retry_interval();
        let mut attempt: u32 = 0;

        loop {
            match self.submit_batch_finality_signatures(batch).await {
                Ok(Some(res)) => {
                    info!(
                        btc_pk = %self.btc_pk_hex(),
                        tx_hash = %res.tx_hash,
                        last_voted_height = self.get_last_voted_height(),
                        "submitted finality signatures"
                    );
                    return true;
                }
                Ok(None) => return true,
                Err(InstanceError::Client(e)) if e.is_retriable() => {
                    attempt += 1;
                    if attempt > max_retries {
                        self.escalate(InstanceError::RetriesExhausted {
                            attempts: attempt,
                            last_error: e.to_string(),
                        })
                        .await;
                        return false;
                    }
                    warn!(
                        attempt = attempt,
                        error = %e,
                        "retriable submission failure; backing off"
                    );
                    tokio::select! {
                        _ = quit.recv() => return false,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay *= 2;
                }
                Err(e) => {
                    // The poller never re-emits a height; dropping the batch
                    // would lose these votes. Surface the failure to the
                    // supervisor instead.
                    self.escalate(e).await;
                    return false;
                }
            }
        }
    }

    /// Sign and submit finality votes for a batch of consecutive blocks.
    ///
    /// Guarantees at most one signature per height: already-voted heights
    /// are skipped up front, the EOTS manager refuses a second message at a
    /// signed height, and a chain-side duplicate report advances
    /// `last_voted_height` past the batch without retrying.
    pub async fn submit_batch_finality_signatures(
        &self,
        blocks: &[BlockInfo],
    ) -> Result<Option<TxResponse>, InstanceError> {
        let last_voted = self.get_last_voted_height();

        let mut targets = Vec::with_capacity(blocks.len());
        for block in blocks {
            // Defense in depth against a restarted poller re-sending history
            if block.height <= last_voted {
                debug!(height = block.height, "skipping already-voted height");
                continue;
            }
            let power = self
                .cc
                .query_finality_provider_voting_power(&self.btc_pk, block.height)
                .await?;
            if power == 0 {
                debug!(height = block.height, "no voting power; skipping height");
                continue;
            }
            targets.push(*block);
        }
        if targets.is_empty() {
            return Ok(None);
        }

        let mut voted_blocks = Vec::with_capacity(targets.len());
        let mut proofs = Vec::with_capacity(targets.len());
        let mut pub_rands = Vec::with_capacity(targets.len());
        let mut sigs = Vec::with_capacity(targets.len());

        for block in &targets {
            let proof = match self.pub_rand_store.get_pub_rand_proof(
                &self.chain_id,
                &self.btc_pk,
                block.height,
            ) {
                Ok(proof) => proof,
                Err(StoreError::NotFound(_)) => {
                    return Err(InstanceError::MissingPubRandProof {
                        chain_id: self.chain_id.clone(),
                        height: block.height,
                    });
                }
                Err(e) => return Err(e.into()),
            };

            let pub_rand = self
                .em
                .create_randomness_pair_list(&self.btc_pk, &self.chain_id, block.height, 1)
                .await?
                .first()
                .copied()
                .ok_or_else(|| {
                    InstanceError::Crypto(CryptoError::PublicRandomnessParseFailed)
                })?;

            let msg_hash =
                payload::finality_vote_msg_hash(&self.chain_id, block.height, &block.hash);
            let sig = match self
                .em
                .sign_eots(
                    &self.btc_pk,
                    &self.chain_id,
                    &msg_hash,
                    block.height,
                    &self.passphrase,
                )
                .await
            {
                Ok(sig) => sig,
                Err(e) if e.is_double_sign() => {
                    warn!(
                        height = block.height,
                        btc_pk = %self.btc_pk_hex(),
                        "signer refused a double sign; dropping height"
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            voted_blocks.push(*block);
            proofs.push(proof);
            pub_rands.push(pub_rand);
            sigs.push(sig);
        }
        if voted_blocks.is_empty() {
            return Ok(None);
        }

        let max_height = voted_blocks
            .iter()
            .map(|b| b.height)
            .max()
            .unwrap_or(last_voted);

        match self
            .cc
            .submit_batch_finality_sigs(&self.btc_pk, &voted_blocks, &proofs, &pub_rands, &sigs)
            .await
        {
            Ok(res) => {
                self.update_last_voted_height(max_height)?;
                self.metrics
                    .incr_submitted_sigs(&self.btc_pk_hex(), voted_blocks.len() as u64);
                Ok(Some(res))
            }
            Err(e) if e.is_already_submitted() || e.is_double_sign() => {
                // The chain already holds votes in this range. Advance past
                // it; a voted height is never retried.
                warn!(
                    error = %e,
                    max_height = max_height,
                    "chain reported existing votes; advancing past batch"
                );
                self.update_last_voted_height(max_height)?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist then cache the new voted height, before the next batch is
    /// accepted.
    fn update_last_voted_height(&self, height: u64) -> Result<(), InstanceError> {
        self.fp_store.set_last_voted_height(&self.btc_pk, height)?;
        self.last_voted_height.store(height, Ordering::Release);
        self.metrics
            .record_last_voted_height(&self.btc_pk_hex(), height);
        Ok(())
    }

    // ==================== status-update loop ====================

    async fn status_loop(&self, mut quit: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.timing.status_update_interval());
        loop {
            tokio::select! {
                _ = quit.recv() => {
                    debug!(btc_pk = %self.btc_pk_hex(), "exiting status update loop");
                    return;
                }
                _ = ticker.tick() => {
                    match self.update_status_once().await {
                        Ok(keep_running) => {
                            if !keep_running {
                                return;
                            }
                        }
                        Err(e) if e.is_critical() => {
                            self.escalate(e).await;
                            return;
                        }
                        Err(e) => warn!(error = %e, "status update failed"),
                    }
                }
            }
        }
    }

    /// One status poll. Returns false when the instance disabled itself.
    async fn update_status_once(&self) -> Result<bool, InstanceError> {
        let tip = self.cc.query_best_block().await?;
        let power = self
            .cc
            .query_finality_provider_voting_power(&self.btc_pk, tip.height)
            .await?;

        if power > 0 {
            self.persist_status(FinalityProviderStatus::Active)?;
            return Ok(true);
        }

        let (slashed, jailed) = self
            .cc
            .query_finality_provider_slashed_or_jailed(&self.btc_pk)
            .await?;

        if slashed {
            error!(btc_pk = %self.btc_pk_hex(), "finality provider slashed; disabling instance");
            self.persist_status(FinalityProviderStatus::Slashed)?;
            self.disable();
            return Ok(false);
        }
        if jailed {
            warn!(btc_pk = %self.btc_pk_hex(), "finality provider jailed; disabling instance");
            self.persist_status(FinalityProviderStatus::Jailed)?;
            self.disable();
            return Ok(false);
        }
        if self.get_status() == FinalityProviderStatus::Active {
            self.persist_status(FinalityProviderStatus::Inactive)?;
        }
        Ok(true)
    }

    /// Persist a status change through the store's guarded update.
    fn persist_status(&self, status: FinalityProviderStatus) -> Result<(), InstanceError> {
        if self.get_status() == status {
            return Ok(());
        }
        self.fp_store.set_status(&self.btc_pk, status)?;
        let old = {
            let mut cached = self.status.write();
            std::mem::replace(&mut *cached, status)
        };
        self.metrics.record_status(&self.btc_pk_hex(), status);
        info!(
            btc_pk = %self.btc_pk_hex(),
            old_status = %old,
            new_status = %status,
            "finality provider status updated"
        );
        Ok(())
    }

    /// Stop the signing and commit loops without tearing down state.
    fn disable(&self) {
        let _ = self.run_state.compare_exchange(
            STATE_RUNNING,
            STATE_STOPPED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        let _ = self.quit.send(());
    }

    async fn escalate(&self, error: InstanceError) {
        error!(btc_pk = %self.btc_pk_hex(), error = %error, "instance hit a critical error");
        let _ = self
            .crit_tx
            .send(CriticalError {
                btc_pk: self.btc_pk,
                error,
            })
            .await;
    }
}
