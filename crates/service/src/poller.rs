//! Chain poller: an ordered feed of new consumer-chain blocks.
//!
//! The poller walks heights upward from its start height, never skipping
//! and never going back, and pushes each block into a bounded channel the
//! finality-submission loop drains in batches.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use fp_clientcontroller::ClientController;
use fp_config::PollerConfig;
use fp_types::BlockInfo;

/// Producer of an ordered block stream.
pub struct ChainPoller {
    cc: Arc<dyn ClientController>,
    config: PollerConfig,
    next_height: u64,
    block_tx: mpsc::Sender<BlockInfo>,
    quit: broadcast::Receiver<()>,
}

impl ChainPoller {
    /// Create a poller starting at `start_height`; returns the consumer end
    /// of the block channel.
    pub fn new(
        cc: Arc<dyn ClientController>,
        config: PollerConfig,
        start_height: u64,
        quit: broadcast::Receiver<()>,
    ) -> (Self, mpsc::Receiver<BlockInfo>) {
        let (block_tx, block_rx) = mpsc::channel(config.buffer_size);
        let poller = Self {
            cc,
            config,
            next_height: start_height,
            block_tx,
            quit,
        };
        (poller, block_rx)
    }

    /// Run the poll loop on its own task.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(start_height = self.next_height, "starting chain poller");
            let mut ticker = tokio::time::interval(self.config.poll_interval());
            loop {
                tokio::select! {
                    _ = self.quit.recv() => {
                        debug!("exiting chain poller");
                        return;
                    }
                    _ = ticker.tick() => {
                        if !self.poll_once().await {
                            return;
                        }
                    }
                }
            }
        })
    }

    /// Fetch every block up to the current tip. Returns false when the
    /// consumer side has gone away.
    async fn poll_once(&mut self) -> bool {
        let tip = match self.cc.query_best_block().await {
            Ok(tip) => tip,
            Err(e) => {
                warn!(error = %e, "failed to query best block");
                return true;
            }
        };

        while self.next_height <= tip.height {
            let block = match self.cc.query_block(self.next_height).await {
                Ok(block) => block,
                Err(e) => {
                    warn!(height = self.next_height, error = %e, "failed to query block");
                    return true;
                }
            };
            if self.block_tx.send(block).await.is_err() {
                debug!("block consumer dropped; exiting chain poller");
                return false;
            }
            self.next_height += 1;
        }
        true
    }
}
