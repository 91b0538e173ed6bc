//! CLI command definitions and handlers.
//!
//! Each subcommand lives in its own module; this module defines the clap
//! surface and the shared daemon wiring.

pub mod create_fp;
pub mod init;
pub mod keys;
pub mod list_fp;
pub mod register_fp;
pub mod start;
pub mod unjail;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use fp_clientcontroller::{JsonRpcClientConfig, JsonRpcClientController};
use fp_config::Config;
use fp_eotsmanager::LocalEotsManager;
use fp_service::FinalityProviderApp;
use fp_store::Database;

use crate::utils::{CliError, CliResult, OutputFormat};

/// fpd - a finality provider daemon for Bitcoin-secured finality
#[derive(Parser, Debug)]
#[command(name = "fpd")]
#[command(version)]
#[command(about = "Finality provider daemon and command-line tools", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Daemon home directory
    #[arg(global = true, long)]
    pub home: Option<PathBuf>,

    /// Global output format for command results
    #[arg(global = true, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Enable verbose logging
    #[arg(global = true, short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the home directory with a default configuration
    Init(init::InitArgs),

    /// Key management commands
    #[command(subcommand)]
    Keys(keys::KeysCommands),

    /// Create and persist a finality provider
    CreateFp(create_fp::CreateFpArgs),

    /// Register a created finality provider on-chain
    RegisterFp(register_fp::RegisterFpArgs),

    /// Send an unjail transaction for a jailed finality provider
    Unjail(unjail::UnjailArgs),

    /// List stored finality providers
    ListFp(list_fp::ListFpArgs),

    /// Run the daemon
    Start(start::StartArgs),
}

/// Execute the CLI with parsed arguments.
pub async fn run_cli(cli: Cli) -> CliResult<()> {
    let log_level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(cli.verbose >= 2)
        .init();

    let home = cli.home.clone().unwrap_or_else(fp_config::default_home_dir);

    match cli.command {
        Commands::Init(args) => init::execute(args, &home),
        Commands::Keys(cmd) => keys::execute(cmd, &home, cli.output).await,
        Commands::CreateFp(args) => create_fp::execute(args, &home, cli.output).await,
        Commands::RegisterFp(args) => register_fp::execute(args, &home, cli.output).await,
        Commands::Unjail(args) => unjail::execute(args, &home).await,
        Commands::ListFp(args) => list_fp::execute(args, &home, cli.output).await,
        Commands::Start(args) => start::execute(args, &home).await,
    }
}

/// Load the configuration from the home directory.
pub(crate) fn load_config(home: &std::path::Path) -> CliResult<Config> {
    Ok(Config::load(&fp_config::default_config_path(home))?)
}

/// Wire the full app over the configured database, local EOTS manager and
/// JSON-RPC chain client.
pub(crate) fn build_app(config: Config) -> CliResult<Arc<FinalityProviderApp>> {
    if !config.eots.manager_address.is_empty() {
        return Err(CliError::InvalidArgument(
            "remote EOTS managers are not supported; leave eots.manager_address empty".into(),
        ));
    }

    let db = Arc::new(Database::open(&fp_store::DatabaseConfig {
        path: config.db.path.clone(),
        ..Default::default()
    })?);
    let eots_db = Arc::new(Database::open_at(&config.eots.db_path)?);
    let em = Arc::new(LocalEotsManager::new(eots_db));

    let cc = Arc::new(JsonRpcClientController::new(&JsonRpcClientConfig {
        rpc_addr: config.chain.rpc_addr.clone(),
        request_timeout: config.chain.request_timeout(),
    })?);

    Ok(Arc::new(FinalityProviderApp::new(
        Arc::new(config),
        db,
        cc,
        em,
    )))
}
