//! S3 relay server.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────────┐
//!                       │                      S3 RELAY                        │
//!                       │                                                      │
//!   Client Request      │  ┌─────────┐   ┌──────────┐   ┌─────────┐            │
//!   ────────────────────┼─▶│   net   │──▶│ routing  │──▶│ signing │            │
//!                       │  │listener │   │+sanitize │   │ SigV4   │            │
//!                       │  └─────────┘   └──────────┘   └────┬────┘            │
//!                       │                                    │                 │
//!                       │                                    ▼                 │
//!   Client Response     │  ┌─────────┐   ┌──────────┐   ┌─────────┐            │
//!   ◀───────────────────┼──│  link   │◀──│  relay   │◀──│  link   │◀───────────┼── S3 Origin
//!                       │  │ client  │   │ session  │   │ origin  │            │
//!                       │  └─────────┘   └──────────┘   └─────────┘            │
//!                       │                                                      │
//!                       │  config · observability · lifecycle · admin          │
//!                       └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use s3_relay::admin::serve_admin;
use s3_relay::config::{load_config, ConfigWatcher, RelayConfig};
use s3_relay::lifecycle::{spawn_signal_handler, Shutdown};
use s3_relay::observability::{logging, metrics};
use s3_relay::RelayServer;

#[derive(Parser)]
#[command(name = "s3-relay")]
#[command(about = "Streaming reverse proxy for S3-compatible object storage", long_about = None)]
struct Args {
    /// Path to the TOML configuration file; watched for changes
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "s3-relay starting");

    if args.config.is_none() {
        tracing::warn!("No configuration file given, running with defaults and no routes");
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        origin = %format!("{}:{}", config.origin.host, config.origin.port),
        routes = config.routes.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    // Dropping the handle stops the watcher.
    let (config_updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        None => (tokio::sync::mpsc::unbounded_channel().1, None),
    };

    let shutdown = Shutdown::new();
    spawn_signal_handler(&shutdown);

    let server = RelayServer::new(config.clone());

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = server.state();
        let admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = serve_admin(admin_listener, state, admin_shutdown).await {
                tracing::error!(error = %e, "Admin API stopped");
            }
        });
    }

    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
