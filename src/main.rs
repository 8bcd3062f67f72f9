//! alertbridge - forks Alertmanager traffic between an in-process and a
//! remote Alertmanager.

use alertbridge::{app::App, cli::Cli, config::Config};
use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = match Config::load_with_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            tracing_subscriber::fmt().init();
            error!("Failed to load configuration: {:#}", err);
            std::process::exit(1);
        }
    };

    // RUST_LOG takes precedence over the configured level.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("alertbridge starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Org ID: {}", config.org_id);
    info!("Mode: {}", config.forking.mode);
    info!("Sync Interval: {}s", config.forking.sync_interval_seconds);
    info!("Remote URL: {}", config.remote.url);
    info!("Remote Tenant: {}", config.remote.tenant_id);
    info!("Queue Capacity: {}", config.sender.queue_capacity);
    info!("Max Batch Size: {}", config.sender.max_batch_size);
    info!(
        "API: {}",
        if config.api.enabled {
            config.api.listen_address.to_string()
        } else {
            "Disabled".to_string()
        }
    );
    info!(
        "Metrics: {}",
        if config.metrics.enabled {
            config.metrics.listen_address.to_string()
        } else {
            "Disabled".to_string()
        }
    );
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(config).build(shutdown_rx).await?;

    info!("alertbridge initialized successfully.");

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received. Shutting down gracefully...");
        let _ = shutdown_tx.send(true);
    });

    app.run().await?;
    info!("All tasks shut down. Exiting.");
    Ok(())
}
