//! `keys` - manage chain account keys and EOTS keys.

use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use fp_eotsmanager::{EotsManager, LocalEotsManager};
use fp_service::ChainKeyring;
use fp_store::Database;

use crate::commands::load_config;
use crate::utils::{print_result, CliResult, OutputFormat};

/// Key management commands.
#[derive(Subcommand, Debug)]
pub enum KeysCommands {
    /// Create a new consumer-chain account key
    Add(AddArgs),

    /// Create a new EOTS key in the local EOTS manager
    NewEots(NewEotsArgs),

    /// List stored chain account keys
    List,
}

/// Arguments for `keys add`.
#[derive(Parser, Debug)]
pub struct AddArgs {
    /// Keyring alias for the new account key
    #[arg(long)]
    pub key_name: String,
}

/// Arguments for `keys new-eots`.
#[derive(Parser, Debug)]
pub struct NewEotsArgs {
    /// Keyring alias for the new EOTS key
    #[arg(long)]
    pub key_name: String,

    /// Passphrase protecting the key
    #[arg(long, default_value = "")]
    pub passphrase: String,

    /// HD derivation path recorded with the key
    #[arg(long, default_value = "")]
    pub hd_path: String,
}

/// Execute a key management command.
pub async fn execute(cmd: KeysCommands, home: &Path, output: OutputFormat) -> CliResult<()> {
    let config = load_config(home)?;

    match cmd {
        KeysCommands::Add(args) => {
            let db = Arc::new(Database::open_at(&config.db.path)?);
            let keyring = ChainKeyring::new(db, &config.chain.address_prefix);
            let info = keyring.create_chain_key(&args.key_name)?;
            match output {
                OutputFormat::Json => print_result(&serde_json::to_string_pretty(
                    &serde_json::json!({ "name": info.name, "address": info.address }),
                )?),
                OutputFormat::Text => {
                    print_result(&format!("name: {}\naddress: {}", info.name, info.address))
                }
            }
        }
        KeysCommands::NewEots(args) => {
            let eots_db = Arc::new(Database::open_at(&config.eots.db_path)?);
            let em = LocalEotsManager::new(eots_db);
            let pk = em
                .create_key(&args.key_name, &args.passphrase, &args.hd_path)
                .await?;
            match output {
                OutputFormat::Json => print_result(&serde_json::to_string_pretty(
                    &serde_json::json!({ "name": args.key_name, "eots_pk": hex::encode(pk) }),
                )?),
                OutputFormat::Text => print_result(&format!("eots_pk: {}", hex::encode(pk))),
            }
        }
        KeysCommands::List => {
            let db = Arc::new(Database::open_at(&config.db.path)?);
            let keyring = ChainKeyring::new(db, &config.chain.address_prefix);
            for info in keyring.list()? {
                print_result(&format!("{}\t{}", info.name, info.address));
            }
        }
    }
    Ok(())
}
