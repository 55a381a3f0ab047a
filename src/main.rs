//! EmberKV server entry point.
//!
//! Parses the command line, sets up logging, binds the listener, and serves
//! until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use emberkv::{Config, Server};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .with_context(|| format!("invalid log level {:?}", config.log_level))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        // Without a signal handler we just serve until killed
        warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(&config)?;

    info!(version = emberkv::VERSION, "Starting EmberKV");

    let server = Server::bind(&config)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_address()))?;

    let storage = std::sync::Arc::clone(server.storage());
    server.run_until(shutdown_signal()).await;

    let stats = storage.stats();
    info!(
        keys = stats.keys,
        gets = stats.gets,
        sets = stats.sets,
        expired = stats.expired,
        "Server shutdown complete"
    );
    Ok(())
}
