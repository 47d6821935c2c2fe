//! gateway-adblock - ad-blocking lists for Cloudflare Gateway
//!
//! Downloads hosts and adblock lists, reduces them to a minimal domain set
//! and keeps Cloudflare Gateway lists and a DNS block policy in sync with it.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use gateway_adblock::cli::{Cli, Commands};
use gateway_adblock::commands;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Sync { group, dry_run } => commands::sync::run(group, dry_run, &cli.config).await,
        Commands::Delete { group } => commands::delete::run(&group, &cli.config).await,
        Commands::Status { group } => commands::status::run(group, &cli.config).await,
        Commands::Init { force } => commands::init::run(force, &cli.config),
        Commands::Version => {
            println!("gateway-adblock {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
