//! fpd binary entry point.
//!
//! Exit codes: 0 success, 1 usage error, 2 runtime error.

use clap::Parser;

use fp_cli::{run_cli, Cli};

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version requests are successes, not usage errors
            if e.use_stderr() {
                e.print().ok();
                std::process::exit(1);
            }
            e.print().ok();
            std::process::exit(0);
        }
    };

    if let Err(e) = run_cli(cli).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}
