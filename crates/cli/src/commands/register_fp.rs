//! `register-fp` - register a created finality provider on-chain.

use std::path::Path;

use clap::Parser;

use crate::commands::{build_app, load_config};
use crate::utils::{print_result, CliError, CliResult, OutputFormat};

/// Arguments for the register-fp command.
#[derive(Parser, Debug)]
pub struct RegisterFpArgs {
    /// Hex of the x-only EOTS public key
    #[arg(long)]
    pub eots_pk: String,
}

/// Submit the registration transaction and wait for the durable status
/// transition.
pub async fn execute(args: RegisterFpArgs, home: &Path, output: OutputFormat) -> CliResult<()> {
    let eots_pk = fp_types::btc_pk_from_hex(&args.eots_pk)
        .map_err(|e| CliError::InvalidArgument(e.to_string()))?;

    let config = load_config(home)?;
    let app = build_app(config)?;
    app.start().map_err(CliError::App)?;
    let result = app.register_finality_provider(&eots_pk).await;
    app.stop().await?;
    let res = result?;

    match output {
        OutputFormat::Json => print_result(&serde_json::to_string_pretty(&serde_json::json!({
            "eots_pk": hex::encode(res.btc_pk),
            "fp_addr": res.fp_addr,
            "tx_hash": res.tx_hash,
        }))?),
        OutputFormat::Text => print_result(&format!(
            "registered finality provider\n  tx_hash: {}",
            res.tx_hash
        )),
    }
    Ok(())
}
