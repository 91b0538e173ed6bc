//! `list-fp` - list stored finality providers.

use std::path::Path;

use clap::Parser;

use crate::commands::{build_app, load_config};
use crate::utils::{print_result, CliResult, OutputFormat};

/// Arguments for the list-fp command.
#[derive(Parser, Debug)]
pub struct ListFpArgs {}

/// Print every stored finality provider.
pub async fn execute(_args: ListFpArgs, home: &Path, output: OutputFormat) -> CliResult<()> {
    let config = load_config(home)?;
    let app = build_app(config)?;
    let infos = app
        .manager()
        .all_finality_providers()
        .map_err(fp_service::AppError::Manager)?;

    match output {
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = infos
                .iter()
                .map(|info| {
                    serde_json::json!({
                        "eots_pk": info.btc_pk_hex,
                        "fp_addr": info.fp_addr,
                        "chain_id": info.chain_id,
                        "status": info.status.to_string(),
                        "last_voted_height": info.last_voted_height,
                    })
                })
                .collect();
            print_result(&serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => {
            for info in infos {
                print_result(&format!(
                    "{}\t{}\t{}\tvoted@{}",
                    info.btc_pk_hex, info.status, info.chain_id, info.last_voted_height
                ));
            }
        }
    }
    Ok(())
}
