//! Telemetry hub.
//!
//! # Architecture Overview
//!
//! ```text
//!   log / call ingestion (HTTP, in-process)
//!        │
//!        ▼
//!   ┌──────────────┐   metrics    ┌──────────────────┐
//!   │  telemetry   │─────────────▶│ kpi::board       │ EMA statistics,
//!   │  store       │              │ (derivation)     │ endpoint activity
//!   └──────┬───────┘              └────────┬─────────┘
//!          │ logs / metrics                │ window
//!          ▼                               ▼
//!   ┌──────────────────────────────────────────────┐
//!   │ relays: logs · metrics · performance · hero  │◀── health supervisor
//!   └──────────────────────┬───────────────────────┘◀── connectivity manager
//!                          ▼
//!              HTTP API + WebSocket feeds
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use telemetry_hub::config::{load_config, HubConfig};
use telemetry_hub::lifecycle::{signals, Hub};
use telemetry_hub::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "telemetry-hub")]
#[command(about = "Telemetry collection and relay hub", long_about = None)]
struct Args {
    /// TOML config file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => HubConfig::default(),
    };

    logging::init_tracing(&config.observability.log_level);
    tracing::info!(version = %config.server.version, "telemetry-hub starting");

    tracing::info!(
        bind_address = %config.server.bind_address,
        connectivity = config.connectivity.enabled,
        health = config.health.enabled,
        log_dir = ?config.telemetry.log_dir,
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

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let mut hub = Hub::build(config)?;
    hub.start();

    let shutdown = hub.shutdown_handle();
    let server = hub.http_server();
    let serve = tokio::spawn(async move {
        server
            .run(listener, async move {
                tokio::select! {
                    _ = signals::wait_for_signal() => {}
                    _ = shutdown.wait() => {}
                }
            })
            .await
    });

    if let Err(e) = serve.await? {
        tracing::error!(error = %e, "HTTP server failed");
    }
    hub.stop().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
