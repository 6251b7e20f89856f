//! # Bridge Runtime
//!
//! Serves the peer WebSocket endpoint and the HTTP control plane on one
//! listener until Ctrl+C.
//!
//! ## Startup Sequence
//!
//! 1. Parse flags (each with a `BRIDGE_*` environment fallback)
//! 2. Initialize logging (`RUST_LOG` wins over `--debug`)
//! 3. Validate configuration and bind
//! 4. Start the liveness sweeper
//! 5. Wait for Ctrl+C, then cancel pending calls and drain the server

mod args;

use anyhow::Result;
use args::Args;
use clap::Parser;
use rpc_bridge::{BridgeService, LoggingRequestHandler};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_logging(debug: bool, json: bool) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    if json {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug, args.json_logs)?;

    let config = args.into_config();
    info!(
        version = rpc_bridge::VERSION,
        call_timeout_ms = config.calls.base_timeout.as_millis(),
        bulk_timeout_ms = config.calls.bulk_timeout.as_millis(),
        sweep_interval_ms = config.sweeper.interval.as_millis(),
        max_message_size = config.transport.max_message_size,
        "Starting RPC bridge"
    );

    let mut service =
        BridgeService::with_request_handler(config, Arc::new(LoggingRequestHandler))?;
    let addr = service.start().await?;

    let ws_path = &service.config().server.ws_path;
    let api_prefix = &service.config().server.api_prefix;
    info!(
        peer_url = %format!("ws://{addr}{ws_path}"),
        control_url = %format!("http://{addr}{api_prefix}"),
        "Bridge is running. Press Ctrl+C to stop."
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    service.shutdown().await;
    Ok(())
}
