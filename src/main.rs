//! Calendar API security gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                     GATEWAY                          │
//!   Client Request     │  ┌──────────┐   ┌──────────────────────────────────┐ │
//!   ───────────────────┼─▶│  layers  │──▶│        admission pipeline        │ │
//!                      │  │ req-id   │   │ ip allow-list → ip rate limit →  │ │
//!                      │  │ trace    │   │ payload guard → sanitize →       │ │
//!                      │  │ timeout  │   │ injection → authenticate →       │ │
//!                      │  │ cors     │   │ key rate limit → audit           │ │
//!                      │  └──────────┘   └───────────────┬──────────────────┘ │
//!                      │                                 │                    │
//!   Client Response    │  ┌──────────┐                   ▼                    │
//!   ◀──────────────────┼──│ envelope │◀────────── downstream router           │
//!                      │  └──────────┘                                        │
//!                      │                                                      │
//!                      │  config (file + env, hot reload) · observability ·   │
//!                      │  lifecycle (signals, shutdown, janitor)              │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use calendar_gateway::config::loader::load;
use calendar_gateway::config::watcher::ConfigWatcher;
use calendar_gateway::lifecycle::signals::spawn_signal_handler;
use calendar_gateway::observability::{logging, metrics};
use calendar_gateway::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "calendar-gateway")]
#[command(about = "Security gateway for the calendar API", long_about = None)]
struct Args {
    /// TOML config file. Environment variables override its values.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load(args.config.as_deref())?;
    logging::init_tracing(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "calendar-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        environment = ?config.environment,
        request_timeout_secs = config.timeouts.request_secs,
        key_rate_limit = config.key_rate_limit.max_requests,
        ip_rate_limit = config.ip_rate_limit.max_requests,
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

    // Hot reload only applies when a config file is in use.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (Some(handle), updates),
                Err(e) => {
                    tracing::error!(error = %e, "Config watcher failed to start, hot reload disabled");
                    (None, updates)
                }
            }
        }
        None => (None, mpsc::unbounded_channel().1),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
