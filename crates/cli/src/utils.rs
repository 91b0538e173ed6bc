//! Shared CLI utilities: error types, exit codes and output formatting.

use clap::ValueEnum;
use thiserror::Error;

/// CLI error types.
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid argument or flag combination
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration problem
    #[error("configuration error: {0}")]
    Config(#[from] fp_config::ConfigError),

    /// Storage problem
    #[error("store error: {0}")]
    Store(#[from] fp_store::StoreError),

    /// EOTS manager problem
    #[error("eots manager error: {0}")]
    Eots(#[from] fp_eotsmanager::EotsManagerError),

    /// App-level failure
    #[error("{0}")]
    App(#[from] fp_service::AppError),

    /// Keyring failure
    #[error("keyring error: {0}")]
    Keyring(#[from] fp_service::KeyringError),

    /// Chain interaction failure
    #[error("chain error: {0}")]
    Client(#[from] fp_clientcontroller::ClientError),

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code: 1 for usage errors, 2 for runtime failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => 1,
            _ => 2,
        }
    }
}

/// CLI result type alias.
pub type CliResult<T> = Result<T, CliError>;

/// Output format options.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output for scripting
    Json,
}

/// Print an informational line to stderr so JSON output stays clean.
pub fn print_info(msg: &str) {
    eprintln!("[info] {msg}");
}

/// Print a result line to stdout.
pub fn print_result(msg: &str) {
    println!("{msg}");
}
