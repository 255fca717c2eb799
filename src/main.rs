//! Streaming HTTP relay.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────┐
//!   Browser           │                 STREAM RELAY                 │
//!   POST /proxy       │                                              │
//!   ──────────────────┼─▶ http ─▶ descriptor ─▶ headers ─▶ dispatcher ─┼──▶ Upstream
//!                     │                                       │      │
//!   ◀─────────────────┼── stream relay ◀── composer ◀─────────┘ ◀────┼─── SSE / bytes
//!   line-framed body  │                                              │
//!                     │   config · logging · metrics · lifecycle     │
//!                     └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use stream_relay::config::{load_config, validation::validate_config, ConfigError, RelayConfig};
use stream_relay::http::HttpServer;
use stream_relay::lifecycle::{signals, Shutdown};
use stream_relay::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "stream-relay")]
#[command(about = "Streaming HTTP relay for browser clients", long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init(&config.observability.log_level);

    tracing::info!("stream-relay v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        connect_timeout_secs = config.upstream.connect_timeout_secs,
        max_body_size = config.limits.max_body_size,
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
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(&shutdown);

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
