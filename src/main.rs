//! `shed` gateway.
//!
//! ```text
//!     Client ──X-Client-Timeout-Ms──▶ ┌──────────────────────────────┐
//!                                     │ request id → trace → metrics │
//!                                     │ default timeout → propagate  │──▶ shed (empty 503)
//!                                     │        gateway handler       │
//!                                     └──────────────┬───────────────┘
//!                                                    │ min(own timeout, remaining)
//!                                                    ▼
//!                                     Upstream (X-Client-Timeout-Ms)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use shed::config::watcher::{apply_updates, ConfigWatcher};
use shed::config::{load_config, ShedConfig};
use shed::observability::{logging, metrics};
use shed::ShedServer;

#[derive(Parser)]
#[command(name = "shed")]
#[command(about = "Deadline-propagating, load-shedding HTTP gateway", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Reload [propagation] settings when the config file changes.
    #[arg(short, long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ShedConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "shed starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        default_timeout_ms = ?config.propagation.default_timeout_ms,
        queue_delta = ?config.propagation.queue_delta,
        shed_status = config.propagation.shed_status,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = ShedServer::new(config.clone())?;

    // Dropping the watcher stops it; keep it for the server's lifetime.
    let _watcher = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            let watcher = watcher.run()?;
            tokio::spawn(apply_updates(updates, config, server.propagation()));
            Some(watcher)
        }
        _ => None,
    };

    server.run(listener, shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
