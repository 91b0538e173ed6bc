//! Instance lifecycle: at most one live finality provider per daemon.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use fp_clientcontroller::ClientController;
use fp_config::Config;
use fp_eotsmanager::EotsManager;
use fp_store::{FinalityProviderStore, PubRandProofStore, StoreError};
use fp_types::{BtcPk, FinalityProviderStatus};

use crate::fp_instance::FinalityProviderInstance;
use crate::metrics::FpMetrics;
use crate::{CriticalError, InstanceError};

/// Capacity of the critical-error channel; one in-flight report at a time.
const CRIT_CHANNEL_CAPACITY: usize = 1;

/// Result alias for manager operations.
pub type Result<T> = std::result::Result<T, ManagerError>;

/// Manager error types.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// An instance is already live; the daemon runs at most one
    #[error("an instance is already running for {0}; only one is supported")]
    InstanceAlreadyRunning(String),

    /// No live instance
    #[error("no finality provider instance is running")]
    NoRunningInstance,

    /// The stored status forbids starting an instance
    #[error("finality provider {pk} cannot start in status {status}")]
    NotEligible {
        /// Hex of the provider's BTC key
        pk: String,
        /// Stored status
        status: FinalityProviderStatus,
    },

    /// Storage failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Instance failure
    #[error("instance error: {0}")]
    Instance(#[from] InstanceError),
}

/// Summary of a stored finality provider for listings.
#[derive(Debug, Clone)]
pub struct FinalityProviderInfo {
    /// Hex of the BTC public key
    pub btc_pk_hex: String,
    /// Consumer-chain account address
    pub fp_addr: String,
    /// Chain the provider signs for
    pub chain_id: String,
    /// Lifecycle status
    pub status: FinalityProviderStatus,
    /// Highest voted height
    pub last_voted_height: u64,
}

/// Supervisor of finality-provider instances.
pub struct FinalityProviderManager {
    config: Arc<Config>,
    fp_store: Arc<FinalityProviderStore>,
    pub_rand_store: Arc<PubRandProofStore>,
    cc: Arc<dyn ClientController>,
    em: Arc<dyn EotsManager>,
    metrics: Arc<FpMetrics>,

    instance: RwLock<Option<Arc<FinalityProviderInstance>>>,
    crit_tx: mpsc::Sender<CriticalError>,
    crit_rx: Mutex<Option<mpsc::Receiver<CriticalError>>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    quit: broadcast::Sender<()>,
}

impl FinalityProviderManager {
    /// Create a manager over the shared stores and clients.
    pub fn new(
        config: Arc<Config>,
        fp_store: Arc<FinalityProviderStore>,
        pub_rand_store: Arc<PubRandProofStore>,
        cc: Arc<dyn ClientController>,
        em: Arc<dyn EotsManager>,
        metrics: Arc<FpMetrics>,
    ) -> Self {
        let (crit_tx, crit_rx) = mpsc::channel(CRIT_CHANNEL_CAPACITY);
        let (quit, _) = broadcast::channel(1);
        Self {
            config,
            fp_store,
            pub_rand_store,
            cc,
            em,
            metrics,
            instance: RwLock::new(None),
            crit_tx,
            crit_rx: Mutex::new(Some(crit_rx)),
            monitor: Mutex::new(None),
            quit,
        }
    }

    /// Start an instance for the given provider.
    ///
    /// Refused when another instance is live or the stored status is not
    /// startable.
    pub async fn start_finality_provider(
        self: &Arc<Self>,
        btc_pk: &BtcPk,
        passphrase: &str,
    ) -> Result<()> {
        if let Some(existing) = self.instance.read().as_ref() {
            return Err(ManagerError::InstanceAlreadyRunning(existing.btc_pk_hex()));
        }

        let fp = self.fp_store.get_finality_provider(btc_pk)?;
        if !fp.should_start() {
            return Err(ManagerError::NotEligible {
                pk: hex::encode(btc_pk),
                status: fp.status,
            });
        }

        let instance = Arc::new(FinalityProviderInstance::new(
            *btc_pk,
            Arc::clone(&self.config),
            Arc::clone(&self.fp_store),
            Arc::clone(&self.pub_rand_store),
            Arc::clone(&self.cc),
            Arc::clone(&self.em),
            Arc::clone(&self.metrics),
            passphrase,
            self.crit_tx.clone(),
        )?);
        instance.start().await?;

        *self.instance.write() = Some(Arc::clone(&instance));
        self.metrics.record_status(&instance.btc_pk_hex(), fp.status);
        self.spawn_monitor_once();

        info!(btc_pk = %instance.btc_pk_hex(), "finality provider instance started");
        Ok(())
    }

    /// The live instance, if any.
    pub fn get_finality_provider_instance(&self) -> Result<Arc<FinalityProviderInstance>> {
        self.instance
            .read()
            .clone()
            .ok_or(ManagerError::NoRunningInstance)
    }

    /// Whether an instance for this provider is live.
    pub fn is_finality_provider_running(&self, btc_pk: &BtcPk) -> bool {
        self.instance
            .read()
            .as_ref()
            .is_some_and(|inst| inst.btc_pk() == btc_pk && inst.is_running())
    }

    /// Listing of every stored provider.
    pub fn all_finality_providers(&self) -> Result<Vec<FinalityProviderInfo>> {
        Ok(self
            .fp_store
            .get_all_finality_providers()?
            .into_iter()
            .map(|fp| FinalityProviderInfo {
                btc_pk_hex: fp.btc_pk_hex(),
                fp_addr: fp.fp_addr,
                chain_id: fp.chain_id,
                status: fp.status,
                last_voted_height: fp.last_voted_height,
            })
            .collect())
    }

    /// Escalate an invariant violation into the critical-error path.
    ///
    /// Also used by the app for violations hit outside a running instance,
    /// such as a status write failing after a registration transaction.
    pub async fn escalate_critical(self: &Arc<Self>, crit: CriticalError) {
        self.spawn_monitor_once();
        let _ = self.crit_tx.send(crit).await;
    }

    /// Stop the live instance and the critical-error monitor.
    pub async fn stop(&self) -> Result<()> {
        let _ = self.quit.send(());
        if let Some(handle) = self.monitor.lock().take() {
            let _ = handle.await;
        }

        let instance = self.instance.write().take();
        if let Some(instance) = instance {
            instance.stop().await?;
        }
        debug!("finality provider manager stopped");
        Ok(())
    }

    /// Spawn the monitor reacting to critical errors, once; the first
    /// instance start or escalation brings it up. A report naming the live
    /// instance stops that instance and leaves its state intact.
    fn spawn_monitor_once(self: &Arc<Self>) {
        let mut slot = self.monitor.lock();
        if slot.is_some() {
            return;
        }
        let Some(mut crit_rx) = self.crit_rx.lock().take() else {
            return;
        };

        let manager = Arc::clone(self);
        let mut quit = self.quit.subscribe();
        *slot = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = quit.recv() => {
                        debug!("exiting critical error monitor");
                        return;
                    }
                    crit = crit_rx.recv() => {
                        let Some(crit) = crit else { return };
                        error!(%crit, "critical error reported");
                        let instance = manager.instance.write().take();
                        match instance {
                            Some(instance) if instance.btc_pk() == &crit.btc_pk => {
                                if let Err(e) = instance.stop().await {
                                    error!(error = %e, "failed to stop instance");
                                }
                            }
                            Some(instance) => {
                                // Report from outside the live instance; leave it running
                                *manager.instance.write() = Some(instance);
                            }
                            None => {}
                        }
                    }
                }
            }
        }));
    }
}
