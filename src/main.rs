//! GreenLens API guard.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client Request
//!   ──────────────▶ request id ─▶ trace ─▶ security headers ─▶ compression
//!                                                                  │
//!                                                                  ▼
//!                   handler ◀─ rate limit ◀─ input guard ◀──── timeout
//!                                (429)      (sanitize, 400)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use greenlens_guard::config::{load_config, GuardConfig};
use greenlens_guard::lifecycle::{signals, Shutdown};
use greenlens_guard::observability::{logging, metrics};
use greenlens_guard::HttpServer;

#[derive(Parser)]
#[command(name = "greenlens-guard")]
#[command(about = "Request protection for the GreenLens API", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!("greenlens-guard v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        rate_limit_enabled = config.rate_limit.enabled,
        max_requests = config.rate_limit.max_requests,
        window_ms = config.rate_limit.window_ms,
        compression_enabled = config.compression.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
