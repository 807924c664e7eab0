//! StreamGate CLI - Command-line interface
//!
//! Provides command-line access to StreamGate functionality.

mod commands;

use clap::Parser;

#[derive(Parser)]
#[command(name = "streamgate")]
#[command(about = "An entitlement-gated media streaming origin")]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::handle_command(cli.command).await?;

    Ok(())
}
