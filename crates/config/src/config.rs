//! Main configuration module.
//!
//! Follows the single-config philosophy: every daemon setting is defined in
//! one `fpd.toml` file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};

/// Main configuration struct containing all daemon settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Consumer-chain connection settings
    pub chain: ChainConfig,

    /// EOTS manager settings
    pub eots: EotsConfig,

    /// Daemon database settings
    pub db: DbConfig,

    /// Public-randomness commitment settings
    pub randomness: RandomnessConfig,

    /// Finality-signature submission settings
    pub submission: SubmissionConfig,

    /// Block poller settings
    pub poller: PollerConfig,

    /// Loop interval settings
    pub timing: TimingConfig,

    /// Metrics settings
    pub metrics: MetricsConfig,
}

/// Consumer-chain connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain identifier the daemon signs for
    pub chain_id: String,
    /// HTTP JSON-RPC endpoint of the chain node
    pub rpc_addr: String,
    /// Bech32 human-readable prefix for account addresses
    pub address_prefix: String,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: String::from("chain-test"),
            rpc_addr: String::from("http://127.0.0.1:8645"),
            address_prefix: String::from("fp"),
            request_timeout_ms: 10_000,
        }
    }
}

impl ChainConfig {
    /// The per-request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// EOTS manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EotsConfig {
    /// Remote EOTS manager address; empty runs the embedded local manager
    pub manager_address: String,
    /// Database directory of the local manager
    pub db_path: String,
}

impl Default for EotsConfig {
    fn default() -> Self {
        Self {
            manager_address: String::new(),
            db_path: String::from("./data/fpd-eots"),
        }
    }
}

/// Daemon database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Database directory of the daemon stores
    pub path: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: String::from("./data/fpd"),
        }
    }
}

/// Public-randomness commitment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomnessConfig {
    /// Number of randomness values per committed batch
    pub num_pub_rand: u64,
    /// Minimum committed-but-unconsumed buffer before a new commit is made
    pub min_rand_height_gap: u64,
}

impl Default for RandomnessConfig {
    fn default() -> Self {
        Self {
            num_pub_rand: 1_000,
            min_rand_height_gap: 1_000,
        }
    }
}

/// Finality-signature submission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Maximum consecutive heights submitted in one batch
    pub batch_size: u64,
    /// Maximum retries for a retriable submission error
    pub max_retries: u32,
    /// Initial backoff between retries in milliseconds; doubles per attempt
    pub retry_interval_ms: u64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_retries: 5,
            retry_interval_ms: 1_000,
        }
    }
}

impl SubmissionConfig {
    /// Initial retry backoff as a [`Duration`].
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Block poller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Interval between tip polls in milliseconds
    pub poll_interval_ms: u64,
    /// Capacity of the block channel between poller and submitter
    pub buffer_size: usize,
    /// Fixed scan start height; unset derives it from chain state
    pub static_start_height: Option<u64>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            buffer_size: 1_000,
            static_start_height: None,
        }
    }
}

impl PollerConfig {
    /// The poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Loop interval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Per-instance status refresh interval in milliseconds
    pub status_update_interval_ms: u64,
    /// App-level chain status sync interval in milliseconds
    pub sync_fp_status_interval_ms: u64,
    /// Randomness-commit loop tick interval in milliseconds
    pub randomness_commit_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            status_update_interval_ms: 20_000,
            sync_fp_status_interval_ms: 30_000,
            randomness_commit_interval_ms: 30_000,
        }
    }
}

impl TimingConfig {
    /// Instance status refresh interval.
    pub fn status_update_interval(&self) -> Duration {
        Duration::from_millis(self.status_update_interval_ms)
    }

    /// App-level status sync interval.
    pub fn sync_fp_status_interval(&self) -> Duration {
        Duration::from_millis(self.sync_fp_status_interval_ms)
    }

    /// Randomness-commit tick interval.
    pub fn randomness_commit_interval(&self) -> Duration {
        Duration::from_millis(self.randomness_commit_interval_ms)
    }
}

/// Metrics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Metrics refresh interval in milliseconds
    pub update_interval_ms: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 10_000,
        }
    }
}

impl MetricsConfig {
    /// The refresh interval as a [`Duration`].
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        info!("loading configuration from {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&content)?;

        debug!("configuration parsed, validating");
        config.validate()?;

        info!(
            chain_id = %config.chain.chain_id,
            rpc_addr = %config.chain.rpc_addr,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration out as TOML.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Check that all values are in range and internally consistent.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.chain.chain_id.is_empty() {
            return Err(ConfigError::Validation("chain.chain_id is empty".into()));
        }
        if self.chain.rpc_addr.is_empty() {
            return Err(ConfigError::Validation("chain.rpc_addr is empty".into()));
        }
        if self.chain.address_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "chain.address_prefix is empty".into(),
            ));
        }
        if self.randomness.num_pub_rand == 0 {
            return Err(ConfigError::Validation(
                "randomness.num_pub_rand must be positive".into(),
            ));
        }
        if self.randomness.min_rand_height_gap == 0 {
            return Err(ConfigError::Validation(
                "randomness.min_rand_height_gap must be positive".into(),
            ));
        }
        if self.randomness.min_rand_height_gap > self.randomness.num_pub_rand {
            return Err(ConfigError::Validation(format!(
                "randomness.min_rand_height_gap ({}) exceeds num_pub_rand ({}); \
                 the buffer could never refill",
                self.randomness.min_rand_height_gap, self.randomness.num_pub_rand
            )));
        }
        if self.submission.batch_size == 0 {
            return Err(ConfigError::Validation(
                "submission.batch_size must be positive".into(),
            ));
        }
        if self.poller.buffer_size == 0 {
            return Err(ConfigError::Validation(
                "poller.buffer_size must be positive".into(),
            ));
        }
        if self.db.path.is_empty() || self.eots.db_path.is_empty() {
            return Err(ConfigError::Validation("database paths must be set".into()));
        }
        if self.db.path == self.eots.db_path {
            return Err(ConfigError::Validation(
                "daemon and EOTS databases must use distinct paths".into(),
            ));
        }
        Ok(())
    }
}
