//! Depth Observer - Market Depth Monitor
//!
//! Connects to a depth server, keeps the order book current and reports
//! bounded depth at the configured polling frequency.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use depth_observer::{Config, FeedSupervisor, TracingSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting Depth Observer");

    let config = Arc::new(Config::load()?);
    info!(
        address = %config.address,
        port = config.port,
        frequency = %config.frequency,
        depth = config.depth_levels,
        "Configuration loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!(error = %e, "Failed to listen for ctrl-c"),
        }
    });

    let mut supervisor = FeedSupervisor::new(config);
    let mut sink = TracingSink::new();
    supervisor.run(&mut sink, shutdown_rx).await?;

    info!("Depth Observer stopped");
    Ok(())
}
