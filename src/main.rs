//! HTTP service kit
//!
//! Runs the scaffold with no user routes: `/health`, the 404 fallback, and
//! whatever middleware the config file lists.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ───────────────▶ net::listener ──▶ http::server ──▶ base layers
//!                                                           │
//!                                                           ▼
//!                                         configured middleware
//!                                  (cors, rate_limit, idempotency, logging)
//!                                                           │
//!                                                           ▼
//!     Client Response ◀───────────────────── /health, routes, 404
//!
//!     lifecycle::Server owns the listener, connections and TTL stores:
//!     Uninitialized → Initialized → Running → Stopped
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use axum::Router;
use clap::Parser;

use service_kit::config::{load_config, ServerConfig};
use service_kit::lifecycle::{shutdown_signal, Server};
use service_kit::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "service-kit")]
#[command(about = "HTTP service scaffold with idempotent request handling", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the log filter (e.g. `debug` or `service_kit=trace`)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => ServerConfig::new("service-kit"),
    };
    if let Some(port) = cli.port {
        config.listener.port = port;
    }

    if let Err(e) = logging::init(&config.logging, cli.log_level.as_deref()) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    tracing::info!(
        service = %config.service_name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown_timeout = config.shutdown.timeout();
    let mut server = Server::new();

    if let Err(e) = server.initialize(config, Router::new()) {
        tracing::error!(error = %e, "Initialization failed");
        return ExitCode::FAILURE;
    }

    if let Err(e) = server.start(None).await {
        tracing::error!(error = %e, "Startup failed");
        return ExitCode::FAILURE;
    }

    shutdown_signal().await;

    match server.shutdown(shutdown_timeout).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Shutdown incomplete");
            ExitCode::FAILURE
        }
    }
}
