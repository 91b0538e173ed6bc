//! # Finality Provider Configuration
//!
//! All daemon settings live in one `fpd.toml` file, loaded and validated by
//! [`Config::load`].

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;

pub use config::{
    ChainConfig, Config, DbConfig, EotsConfig, MetricsConfig, PollerConfig, RandomnessConfig,
    SubmissionConfig, TimingConfig,
};
pub use error::{ConfigError, ConfigResult};

use std::path::PathBuf;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "fpd.toml";

/// Default home directory name.
pub const DEFAULT_HOME_DIR: &str = ".fpd";

/// The default daemon home: `~/.fpd`.
pub fn default_home_dir() -> PathBuf {
    dirs::home_dir()
        .map(|p| p.join(DEFAULT_HOME_DIR))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_HOME_DIR))
}

/// The default configuration file path inside a home directory.
pub fn default_config_path(home: &std::path::Path) -> PathBuf {
    home.join(DEFAULT_CONFIG_FILE)
}
