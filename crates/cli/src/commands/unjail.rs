//! `unjail` - send an unjail transaction for a jailed finality provider.

use std::path::Path;

use clap::Parser;

use crate::commands::{build_app, load_config};
use crate::utils::{print_result, CliError, CliResult};

/// Arguments for the unjail command.
#[derive(Parser, Debug)]
pub struct UnjailArgs {
    /// Hex of the x-only EOTS public key
    #[arg(long)]
    pub eots_pk: String,
}

/// Forward the unjail transaction; the chain decides eligibility.
pub async fn execute(args: UnjailArgs, home: &Path) -> CliResult<()> {
    let eots_pk = fp_types::btc_pk_from_hex(&args.eots_pk)
        .map_err(|e| CliError::InvalidArgument(e.to_string()))?;

    let config = load_config(home)?;
    let app = build_app(config)?;
    let tx_hash = app.unjail_finality_provider(&eots_pk).await?;

    print_result(&format!("unjail submitted\n  tx_hash: {tx_hash}"));
    Ok(())
}
