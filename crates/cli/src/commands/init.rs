//! `init` - write a default configuration into the home directory.

use std::path::Path;

use clap::Parser;
use tracing::info;

use fp_config::Config;

use crate::utils::{print_result, CliError, CliResult};

/// Arguments for the init command.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite an existing configuration file
    #[arg(long, default_value = "false")]
    pub force: bool,
}

/// Create the home directory and write the default `fpd.toml`.
pub fn execute(args: InitArgs, home: &Path) -> CliResult<()> {
    std::fs::create_dir_all(home)?;

    let config_path = fp_config::default_config_path(home);
    if config_path.exists() && !args.force {
        return Err(CliError::InvalidArgument(format!(
            "{} already exists; pass --force to overwrite",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    config.db.path = home.join("data").to_string_lossy().into_owned();
    config.eots.db_path = home.join("data-eots").to_string_lossy().into_owned();
    config.save(&config_path)?;

    info!(path = %config_path.display(), "wrote default configuration");
    print_result(&format!("initialized home at {}", home.display()));
    Ok(())
}
