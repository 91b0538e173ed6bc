//! `start` - run the daemon.

use std::path::Path;

use clap::Parser;
use tracing::info;

use crate::commands::{build_app, load_config};
use crate::utils::{CliError, CliResult};

/// Arguments for the start command.
#[derive(Parser, Debug)]
pub struct StartArgs {
    /// Immediately start an instance for this EOTS public key (hex)
    #[arg(long)]
    pub eots_pk: Option<String>,

    /// Passphrase unlocking the EOTS key
    #[arg(long, default_value = "")]
    pub passphrase: String,
}

/// Run the daemon until interrupted.
pub async fn execute(args: StartArgs, home: &Path) -> CliResult<()> {
    let config = load_config(home)?;
    let app = build_app(config)?;
    app.start().map_err(CliError::App)?;

    if let Some(pk_hex) = &args.eots_pk {
        let eots_pk = fp_types::btc_pk_from_hex(pk_hex)
            .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
        app.start_handling_finality_provider(&eots_pk, &args.passphrase)
            .await?;
    }

    info!("daemon running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    app.stop().await?;
    Ok(())
}
