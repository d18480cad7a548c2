//! panelctl - CLI for the panelist interview scheduler
//!
//! Previews and books interviews against a registry file, an optional
//! busy-calendar file and a file-backed interview ledger.

use anyhow::Result;
use clap::Parser;

mod commands;
mod error;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
