//! `create-fp` - create and persist a finality provider.

use std::path::Path;

use clap::Parser;

use fp_types::{CommissionRate, Description};

use crate::commands::{build_app, load_config};
use crate::utils::{print_result, CliError, CliResult, OutputFormat};

/// Arguments for the create-fp command.
#[derive(Parser, Debug)]
pub struct CreateFpArgs {
    /// Keyring alias of the chain account key
    #[arg(long)]
    pub key_name: String,

    /// Target consumer chain; defaults to the configured chain id
    #[arg(long)]
    pub chain_id: Option<String>,

    /// Hex of the x-only EOTS public key
    #[arg(long)]
    pub eots_pk: String,

    /// Passphrase unlocking the EOTS key
    #[arg(long, default_value = "")]
    pub passphrase: String,

    /// Commission rate in [0, 1], e.g. 0.05
    #[arg(long, default_value = "0")]
    pub commission_rate: String,

    /// Display name
    #[arg(long, default_value = "")]
    pub moniker: String,

    /// Identity signature
    #[arg(long, default_value = "")]
    pub identity: String,

    /// Website URL
    #[arg(long, default_value = "")]
    pub website: String,

    /// Security contact e-mail
    #[arg(long, default_value = "")]
    pub security_contact: String,

    /// Free-form details
    #[arg(long, default_value = "")]
    pub details: String,
}

/// Create a finality provider from an existing chain key and EOTS key.
pub async fn execute(args: CreateFpArgs, home: &Path, output: OutputFormat) -> CliResult<()> {
    let eots_pk = fp_types::btc_pk_from_hex(&args.eots_pk)
        .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
    let commission: CommissionRate = args
        .commission_rate
        .parse()
        .map_err(|e: fp_types::TypesError| CliError::InvalidArgument(e.to_string()))?;

    let config = load_config(home)?;
    let chain_id = args
        .chain_id
        .unwrap_or_else(|| config.chain.chain_id.clone());
    let description = Description {
        moniker: args.moniker,
        identity: args.identity,
        website: args.website,
        security_contact: args.security_contact,
        details: args.details,
    };

    let app = build_app(config)?;
    app.start().map_err(CliError::App)?;
    let result = app
        .create_finality_provider(
            &args.key_name,
            &chain_id,
            &args.passphrase,
            eots_pk,
            description,
            commission,
        )
        .await;
    app.stop().await?;
    let info = result?;

    match output {
        OutputFormat::Json => print_result(&serde_json::to_string_pretty(&serde_json::json!({
            "eots_pk": info.btc_pk_hex,
            "fp_addr": info.fp_addr,
            "chain_id": info.chain_id,
            "status": info.status.to_string(),
        }))?),
        OutputFormat::Text => print_result(&format!(
            "created finality provider\n  eots_pk: {}\n  address: {}\n  chain:   {}",
            info.btc_pk_hex, info.fp_addr, info.chain_id
        )),
    }
    Ok(())
}
