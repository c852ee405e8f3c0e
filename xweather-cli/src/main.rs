//! Binary crate for the `xweather` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Interactive configuration
//! - Printing lightning records as JSON

use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(cli::log_filter(cmd.verbose))
        .with_writer(std::io::stderr)
        .init();

    cmd.run().await
}
