//! App orchestrator: channel-mediated create/register/unjail operations and
//! the app-level worker loops.
//!
//! Four long-lived workers run per app: the event loop (create requests and
//! registration events), the registration loop (chain submissions), the
//! metrics loop and the chain-status sync loop. User operations enqueue a
//! request carrying a reply channel; the owning worker serializes handling.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use fp_clientcontroller::{ClientController, ClientError};
use fp_config::Config;
use fp_crypto::pop::pop_msg_hash;
use fp_crypto::ProofOfPossession;
use fp_eotsmanager::{EotsManager, EotsManagerError};
use fp_store::{Database, FinalityProviderStore, PubRandProofStore, StoreError};
use fp_types::{
    BtcPk, CommissionRate, Description, FinalityProviderStatus, TypesError,
};

use crate::fp_manager::{FinalityProviderInfo, FinalityProviderManager, ManagerError};
use crate::keyring::{ChainKeyring, KeyringError};
use crate::metrics::FpMetrics;
use crate::{CriticalError, InstanceError};

const STATE_NEW: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

const REQUEST_CHANNEL_CAPACITY: usize = 16;

/// Result alias for app operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// App-level error types.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Storage failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Chain interaction failure
    #[error("chain error: {0}")]
    Client(#[from] ClientError),

    /// EOTS manager failure
    #[error("eots manager error: {0}")]
    Eots(#[from] EotsManagerError),

    /// Keyring failure
    #[error("keyring error: {0}")]
    Keyring(#[from] KeyringError),

    /// Manager failure
    #[error("manager error: {0}")]
    Manager(#[from] ManagerError),

    /// Invalid user input
    #[error("invalid input: {0}")]
    InvalidInput(#[from] TypesError),

    /// Registration requested for a provider that is past `Created`
    #[error("finality provider {pk} is already registered (status {status})")]
    AlreadyRegistered {
        /// Hex of the provider's BTC key
        pk: String,
        /// Stored status
        status: FinalityProviderStatus,
    },

    /// The registration tx succeeded but the durable status write failed;
    /// the failure has been escalated to the supervisor
    #[error("registration of {pk} is on-chain but the status write failed: {message}")]
    RegistrationNotDurable {
        /// Hex of the provider's BTC key
        pk: String,
        /// The underlying store failure
        message: String,
    },

    /// The app is shutting down; the request was not handled
    #[error("finality provider app is shutting down")]
    ShuttingDown,
}

/// Response to a successful registration.
#[derive(Debug, Clone)]
pub struct RegisterFinalityProviderResponse {
    /// BTC public key of the registered provider
    pub btc_pk: BtcPk,
    /// Consumer-chain account address
    pub fp_addr: String,
    /// Hash of the registration transaction; empty when the chain already
    /// held a prior registration
    pub tx_hash: String,
}

struct CreateFinalityProviderRequest {
    key_name: String,
    chain_id: String,
    passphrase: String,
    eots_pk: BtcPk,
    description: Description,
    commission: CommissionRate,
    resp: oneshot::Sender<Result<FinalityProviderInfo>>,
}

struct RegisterFinalityProviderRequest {
    btc_pk: BtcPk,
    fp_addr: String,
    pop: ProofOfPossession,
    description: Description,
    commission: CommissionRate,
    resp: oneshot::Sender<Result<RegisterFinalityProviderResponse>>,
}

struct FinalityProviderRegisteredEvent {
    btc_pk: BtcPk,
    fp_addr: String,
    tx_hash: String,
    resp: oneshot::Sender<Result<RegisterFinalityProviderResponse>>,
}

struct WorkerChannels {
    create_rx: mpsc::Receiver<CreateFinalityProviderRequest>,
    register_rx: mpsc::Receiver<RegisterFinalityProviderRequest>,
    registered_rx: mpsc::Receiver<FinalityProviderRegisteredEvent>,
}

/// The finality-provider daemon application.
pub struct FinalityProviderApp {
    config: Arc<Config>,
    fp_store: Arc<FinalityProviderStore>,
    pub_rand_store: Arc<PubRandProofStore>,
    keyring: Arc<ChainKeyring>,
    cc: Arc<dyn ClientController>,
    em: Arc<dyn EotsManager>,
    metrics: Arc<FpMetrics>,
    manager: Arc<FinalityProviderManager>,

    run_state: AtomicU8,
    quit: broadcast::Sender<()>,
    create_tx: mpsc::Sender<CreateFinalityProviderRequest>,
    register_tx: mpsc::Sender<RegisterFinalityProviderRequest>,
    registered_tx: mpsc::Sender<FinalityProviderRegisteredEvent>,
    channels: Mutex<Option<WorkerChannels>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl FinalityProviderApp {
    /// Wire the app over its database, chain client and EOTS manager.
    pub fn new(
        config: Arc<Config>,
        db: Arc<Database>,
        cc: Arc<dyn ClientController>,
        em: Arc<dyn EotsManager>,
    ) -> Self {
        let fp_store = Arc::new(FinalityProviderStore::new(Arc::clone(&db)));
        let pub_rand_store = Arc::new(PubRandProofStore::new(Arc::clone(&db)));
        let keyring = Arc::new(ChainKeyring::new(
            Arc::clone(&db),
            &config.chain.address_prefix,
        ));
        let metrics = Arc::new(FpMetrics::new());
        let manager = Arc::new(FinalityProviderManager::new(
            Arc::clone(&config),
            Arc::clone(&fp_store),
            Arc::clone(&pub_rand_store),
            Arc::clone(&cc),
            Arc::clone(&em),
            Arc::clone(&metrics),
        ));

        let (create_tx, create_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let (register_tx, register_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let (registered_tx, registered_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let (quit, _) = broadcast::channel(1);

        Self {
            config,
            fp_store,
            pub_rand_store,
            keyring,
            cc,
            em,
            metrics,
            manager,
            run_state: AtomicU8::new(STATE_NEW),
            quit,
            create_tx,
            register_tx,
            registered_tx,
            channels: Mutex::new(Some(WorkerChannels {
                create_rx,
                register_rx,
                registered_rx,
            })),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// The finality-provider store.
    pub fn fp_store(&self) -> &Arc<FinalityProviderStore> {
        &self.fp_store
    }

    /// The public-randomness proof store.
    pub fn pub_rand_store(&self) -> &Arc<PubRandProofStore> {
        &self.pub_rand_store
    }

    /// The chain account keyring.
    pub fn keyring(&self) -> &Arc<ChainKeyring> {
        &self.keyring
    }

    /// The instance manager.
    pub fn manager(&self) -> &Arc<FinalityProviderManager> {
        &self.manager
    }

    /// The metrics registry.
    pub fn metrics(&self) -> &Arc<FpMetrics> {
        &self.metrics
    }

    /// Spawn the four worker loops. A second call is a no-op.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self
            .run_state
            .compare_exchange(STATE_NEW, STATE_RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }
        let Some(channels) = self.channels.lock().take() else {
            return Ok(());
        };
        let WorkerChannels {
            create_rx,
            register_rx,
            registered_rx,
        } = channels;

        info!("starting finality provider app");
        let mut workers = self.workers.lock();

        let this = Arc::clone(self);
        let quit = self.quit.subscribe();
        workers.push(tokio::spawn(async move {
            this.event_loop(create_rx, registered_rx, quit).await;
        }));

        let this = Arc::clone(self);
        let quit = self.quit.subscribe();
        workers.push(tokio::spawn(async move {
            this.registration_loop(register_rx, quit).await;
        }));

        let this = Arc::clone(self);
        let quit = self.quit.subscribe();
        workers.push(tokio::spawn(async move {
            this.metrics_loop(quit).await;
        }));

        let this = Arc::clone(self);
        let quit = self.quit.subscribe();
        workers.push(tokio::spawn(async move {
            this.chain_status_sync_loop(quit).await;
        }));

        Ok(())
    }

    /// Fan out the quit signal, join every worker, then stop the manager
    /// and close the EOTS manager. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        if self
            .run_state
            .compare_exchange(
                STATE_RUNNING,
                STATE_STOPPED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Ok(());
        }

        info!("stopping finality provider app");
        let _ = self.quit.send(());

        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "app worker ended abnormally");
            }
        }

        self.manager.stop().await?;
        self.em.close().await?;
        debug!("finality provider app stopped");
        Ok(())
    }

    // ==================== user operations ====================

    /// Create and persist a finality provider for an existing EOTS key and
    /// chain account key.
    pub async fn create_finality_provider(
        &self,
        key_name: &str,
        chain_id: &str,
        passphrase: &str,
        eots_pk: BtcPk,
        description: Description,
        commission: CommissionRate,
    ) -> Result<FinalityProviderInfo> {
        let (resp_tx, resp_rx) = oneshot::channel();
        let request = CreateFinalityProviderRequest {
            key_name: key_name.to_string(),
            chain_id: chain_id.to_string(),
            passphrase: passphrase.to_string(),
            eots_pk,
            description,
            commission,
            resp: resp_tx,
        };
        self.create_tx
            .send(request)
            .await
            .map_err(|_| AppError::ShuttingDown)?;
        resp_rx.await.map_err(|_| AppError::ShuttingDown)?
    }

    /// Register a created finality provider on-chain. Replies only after
    /// the `Registered` status is durably persisted.
    pub async fn register_finality_provider(
        &self,
        btc_pk: &BtcPk,
    ) -> Result<RegisterFinalityProviderResponse> {
        let fp = self.fp_store.get_finality_provider(btc_pk)?;
        if fp.status != FinalityProviderStatus::Created {
            return Err(AppError::AlreadyRegistered {
                pk: fp.btc_pk_hex(),
                status: fp.status,
            });
        }

        let (resp_tx, resp_rx) = oneshot::channel();
        let request = RegisterFinalityProviderRequest {
            btc_pk: *btc_pk,
            fp_addr: fp.fp_addr.clone(),
            pop: fp.pop.clone(),
            description: fp.description.clone(),
            commission: fp.commission,
            resp: resp_tx,
        };
        self.register_tx
            .send(request)
            .await
            .map_err(|_| AppError::ShuttingDown)?;
        resp_rx.await.map_err(|_| AppError::ShuttingDown)?
    }

    /// Send an unjail transaction and demote the stored status to
    /// `Inactive`; the next status sync promotes it on observed power.
    ///
    /// No local eligibility pre-check is made; the chain's verdict is
    /// surfaced as-is.
    pub async fn unjail_finality_provider(&self, btc_pk: &BtcPk) -> Result<String> {
        let fp = self.fp_store.get_finality_provider(btc_pk)?;

        let res = self.cc.unjail_finality_provider(btc_pk).await?;

        self.fp_store
            .set_status(btc_pk, FinalityProviderStatus::Inactive)?;
        self.metrics
            .record_status(&fp.btc_pk_hex(), FinalityProviderStatus::Inactive);

        info!(
            btc_pk = %fp.btc_pk_hex(),
            tx_hash = %res.tx_hash,
            "successfully unjailed finality provider"
        );
        Ok(res.tx_hash)
    }

    /// Start an instance for a registered provider.
    pub async fn start_handling_finality_provider(
        &self,
        btc_pk: &BtcPk,
        passphrase: &str,
    ) -> Result<()> {
        self.manager
            .start_finality_provider(btc_pk, passphrase)
            .await?;
        Ok(())
    }

    /// One pass of the chain status sync: refresh every stored provider's
    /// status from its observed voting power and jail/slash flags, then
    /// start an instance for the first eligible provider.
    ///
    /// Returns whether an instance is running after the pass.
    pub async fn sync_finality_provider_status(&self) -> Result<bool> {
        let mut instance_running = false;
        let tip = self.cc.query_best_block().await?;

        for fp in self.fp_store.get_all_finality_providers()? {
            if fp.status.is_terminal() {
                continue;
            }
            let power = match self
                .cc
                .query_finality_provider_voting_power(&fp.btc_pk, tip.height)
                .await
            {
                Ok(power) => power,
                Err(e) => {
                    debug!(btc_pk = %fp.btc_pk_hex(), error = %e, "voting power query failed");
                    continue;
                }
            };

            if self.manager.is_finality_provider_running(&fp.btc_pk) {
                instance_running = true;
                continue;
            }

            let old_status = fp.status;
            let new_status = if power == 0 {
                let (slashed, jailed) = self
                    .cc
                    .query_finality_provider_slashed_or_jailed(&fp.btc_pk)
                    .await?;
                if slashed {
                    self.fp_store
                        .set_status(&fp.btc_pk, FinalityProviderStatus::Slashed)?;
                    FinalityProviderStatus::Slashed
                } else if jailed {
                    self.fp_store
                        .set_status(&fp.btc_pk, FinalityProviderStatus::Jailed)?;
                    FinalityProviderStatus::Jailed
                } else {
                    self.fp_store
                        .update_status_from_voting_power(&fp.btc_pk, power)?
                }
            } else {
                self.fp_store
                    .update_status_from_voting_power(&fp.btc_pk, power)?
            };

            if old_status != new_status {
                info!(
                    btc_pk = %fp.btc_pk_hex(),
                    old_status = %old_status,
                    new_status = %new_status,
                    "synced finality provider status"
                );
                self.metrics.record_status(&fp.btc_pk_hex(), new_status);
            }

            if !new_status.is_startable() {
                continue;
            }
            match self
                .manager
                .start_finality_provider(&fp.btc_pk, "")
                .await
            {
                Ok(()) => instance_running = true,
                Err(ManagerError::InstanceAlreadyRunning(_)) => instance_running = true,
                Err(e) => warn!(btc_pk = %fp.btc_pk_hex(), error = %e, "failed to start instance"),
            }
        }
        Ok(instance_running)
    }

    // ==================== worker loops ====================

    async fn event_loop(
        &self,
        mut create_rx: mpsc::Receiver<CreateFinalityProviderRequest>,
        mut registered_rx: mpsc::Receiver<FinalityProviderRegisteredEvent>,
        mut quit: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = quit.recv() => {
                    debug!("exiting main event loop");
                    return;
                }
                req = create_rx.recv() => {
                    let Some(req) = req else { return };
                    let result = self.handle_create_request(&req).await;
                    let _ = req.resp.send(result);
                }
                event = registered_rx.recv() => {
                    let Some(event) = event else { return };
                    // The status write must be durable before the caller is
                    // told the provider is registered.
                    match self
                        .fp_store
                        .set_status(&event.btc_pk, FinalityProviderStatus::Registered)
                    {
                        Ok(()) => {
                            self.metrics.record_status(
                                &hex::encode(event.btc_pk),
                                FinalityProviderStatus::Registered,
                            );
                            let _ = event.resp.send(Ok(RegisterFinalityProviderResponse {
                                btc_pk: event.btc_pk,
                                fp_addr: event.fp_addr,
                                tx_hash: event.tx_hash,
                            }));
                        }
                        Err(e) => {
                            // Registered on-chain but not locally durable;
                            // the supervisor must see this, not only the
                            // caller.
                            error!(
                                btc_pk = %hex::encode(event.btc_pk),
                                error = %e,
                                "failed to persist REGISTERED status"
                            );
                            let message = e.to_string();
                            self.manager
                                .escalate_critical(CriticalError {
                                    btc_pk: event.btc_pk,
                                    error: InstanceError::Store(e),
                                })
                                .await;
                            let _ = event.resp.send(Err(AppError::RegistrationNotDurable {
                                pk: hex::encode(event.btc_pk),
                                message,
                            }));
                        }
                    }
                }
            }
        }
    }

    async fn handle_create_request(
        &self,
        req: &CreateFinalityProviderRequest,
    ) -> Result<FinalityProviderInfo> {
        // The chain account key must exist before a provider can bind to it
        let fp_addr = self.keyring.address(&req.key_name)?;
        fp_types::validate_account_address(&fp_addr)?;

        let pop = self
            .create_pop(&fp_addr, &req.eots_pk, &req.passphrase)
            .await?;

        self.fp_store.create_finality_provider(
            &fp_addr,
            &req.eots_pk,
            req.description.clone(),
            req.commission,
            &req.key_name,
            &req.chain_id,
            pop,
        )?;

        let pk_hex = hex::encode(req.eots_pk);
        self.metrics
            .record_status(&pk_hex, FinalityProviderStatus::Created);
        info!(
            eots_pk = %pk_hex,
            addr = %fp_addr,
            key_name = %req.key_name,
            "successfully created finality provider"
        );

        let fp = self.fp_store.get_finality_provider(&req.eots_pk)?;
        Ok(FinalityProviderInfo {
            btc_pk_hex: fp.btc_pk_hex(),
            fp_addr: fp.fp_addr,
            chain_id: fp.chain_id,
            status: fp.status,
            last_voted_height: fp.last_voted_height,
        })
    }

    /// Build the proof-of-possession: a BIP-340 signature by the EOTS key
    /// over `SHA256(fp_addr bytes)`.
    async fn create_pop(
        &self,
        fp_addr: &str,
        eots_pk: &BtcPk,
        passphrase: &str,
    ) -> Result<ProofOfPossession> {
        let msg = pop_msg_hash(fp_addr);
        let sig = self.em.sign_schnorr(eots_pk, &msg, passphrase).await?;
        Ok(ProofOfPossession::new_bip340(sig))
    }

    async fn registration_loop(
        &self,
        mut register_rx: mpsc::Receiver<RegisterFinalityProviderRequest>,
        mut quit: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = quit.recv() => {
                    debug!("exiting registration loop");
                    return;
                }
                req = register_rx.recv() => {
                    let Some(req) = req else { return };
                    // No retries here; a failure is almost always a user
                    // error and must not block later requests.
                    let tx_hash = match self
                        .cc
                        .register_finality_provider(
                            &req.btc_pk,
                            &req.pop,
                            req.commission,
                            &req.description,
                        )
                        .await
                    {
                        Ok(res) => {
                            info!(
                                btc_pk = %hex::encode(req.btc_pk),
                                fp_addr = %req.fp_addr,
                                tx_hash = %res.tx_hash,
                                "successfully registered finality provider on chain"
                            );
                            res.tx_hash
                        }
                        Err(e) if e.is_already_submitted() => {
                            // A prior attempt made it on-chain; reconcile by
                            // finishing the local transition with no tx hash.
                            info!(
                                btc_pk = %hex::encode(req.btc_pk),
                                "finality provider was already registered on chain"
                            );
                            String::new()
                        }
                        Err(e) => {
                            error!(
                                btc_pk = %hex::encode(req.btc_pk),
                                error = %e,
                                "failed to register finality provider"
                            );
                            let _ = req.resp.send(Err(e.into()));
                            continue;
                        }
                    };

                    let event = FinalityProviderRegisteredEvent {
                        btc_pk: req.btc_pk,
                        fp_addr: req.fp_addr,
                        tx_hash,
                        resp: req.resp,
                    };
                    if self.registered_tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    async fn metrics_loop(&self, mut quit: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.metrics.update_interval());
        loop {
            tokio::select! {
                _ = quit.recv() => {
                    debug!("exiting metrics update loop");
                    return;
                }
                _ = ticker.tick() => {
                    match self.fp_store.get_all_finality_providers() {
                        Ok(fps) => self.metrics.update_from_providers(&fps),
                        Err(e) => warn!(error = %e, "failed to load providers for metrics"),
                    }
                }
            }
        }
    }

    /// Keeps provider statuses in sync with the chain until an instance is
    /// live, then exits: the instance's own status loop takes over.
    async fn chain_status_sync_loop(&self, mut quit: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.timing.sync_fp_status_interval());
        loop {
            tokio::select! {
                _ = quit.recv() => {
                    debug!("exiting chain status sync loop");
                    return;
                }
                _ = ticker.tick() => {
                    match self.sync_finality_provider_status().await {
                        Ok(true) => {
                            info!("an instance is running; exiting status sync loop");
                            return;
                        }
                        Ok(false) => {}
                        Err(e) => warn!(error = %e, "failed to sync finality provider status"),
                    }
                }
            }
        }
    }
}
