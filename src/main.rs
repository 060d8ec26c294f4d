//! Swapfleet - multi-wallet SPL token swap orchestrator
//! Main entry point

use clap::Parser;
use swapfleet::application::{Cli, CommandExecutor};
use swapfleet::shared::errors::AppError;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize logging with proper configuration
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    println!("🚀 Swapfleet - multi-wallet SPL swap orchestrator");

    let cli = Cli::parse();
    CommandExecutor::execute(&cli).await
}
