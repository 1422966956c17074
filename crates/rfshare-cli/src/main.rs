//! rfshare CLI entry point.

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use rfshare_cli::cli::Cli;
use rfshare_cli::commands;

/// Environment variable holding a log filter, checked before `RUST_LOG`.
const LOG_ENV: &str = "RFSHARE_LOG";

#[tokio::main]
async fn main() {
    // Load .env.local if it exists (RFSHARE_DEVICE, RFSHARE_CONFIG etc.)
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().to_string()));

    fmt().with_env_filter(filter).with_target(false).init();

    if let Err(e) = commands::execute(cli.command).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
