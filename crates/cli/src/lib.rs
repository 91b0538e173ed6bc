//! # Finality Provider CLI
//!
//! Command-line interface for the finality-provider daemon.
//!
//! ## Available Commands
//!
//! - `init` - write a default configuration into the home directory
//! - `keys` - manage chain account keys and EOTS keys
//! - `create-fp` - create and persist a finality provider
//! - `register-fp` - register a created finality provider on-chain
//! - `unjail` - send an unjail transaction for a jailed provider
//! - `list-fp` - list stored finality providers
//! - `start` - run the daemon
//!
//! ## Example Usage
//!
//! ```bash
//! fpd init --home ~/.fpd
//! fpd keys add --key-name alice
//! fpd keys new-eots --key-name alice
//! fpd create-fp --key-name alice --chain-id chain-test --eots-pk <hex> \
//!     --commission-rate 0.05 --moniker "alice"
//! fpd register-fp --eots-pk <hex>
//! fpd start
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod commands;
pub mod utils;

pub use commands::{run_cli, Cli, Commands};
pub use utils::{CliError, CliResult, OutputFormat};

/// CLI application name.
pub const APP_NAME: &str = "fpd";
