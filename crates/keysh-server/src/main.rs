//! keysh server binary entry point.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use keysh_server::{Cli, Listener, ServerConfig};

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let log_format = cli.log_format.into();
    if let Err(e) = keysh_core::init_logging(cli.verbose, cli.log_file.as_deref(), log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "keysh-server starting");

    if let Err(e) = run(&cli).await {
        error!(error = %e, "Server failed");
        eprintln!("keysh-server: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> keysh_core::Result<()> {
    let config = Arc::new(ServerConfig::from_cli(cli)?);
    let listener = Listener::bind(config).await?;
    info!(addr = %listener.local_addr(), "Listening");
    listener.run().await
}
