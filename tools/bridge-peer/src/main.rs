//! Bridge peer: connects to the bridge over WebSocket and answers its calls
//! with locally registered methods.

mod client;
mod methods;

use anyhow::Result;
use clap::Parser;
use client::{PeerClient, PeerConfig};
use methods::MethodRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

#[derive(Parser, Debug)]
#[command(name = "bridge-peer")]
#[command(about = "Peer agent answering RPC bridge calls")]
struct Args {
    /// Bridge WebSocket URL
    #[arg(long, env = "BRIDGE_PEER_URL", default_value = "ws://127.0.0.1:10087/ws")]
    url: String,

    /// Reconnection attempts before giving up
    #[arg(long, default_value_t = client::MAX_RECONNECT_ATTEMPTS)]
    max_attempts: u32,

    /// Delay between reconnection attempts
    #[arg(long, default_value = "3s", value_parser = parse_duration)]
    reconnect_interval: Duration,

    /// Interval between keepalive frames
    #[arg(long, default_value = "25s", value_parser = parse_duration)]
    keepalive_interval: Duration,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .compact()
        .init();

    let config = PeerConfig {
        url: args.url,
        max_reconnect_attempts: args.max_attempts,
        reconnect_interval: args.reconnect_interval,
        keepalive_interval: args.keepalive_interval,
    };
    info!(url = %config.url, "Starting bridge peer");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut client_task = tokio::spawn(
        PeerClient::new(config, Arc::new(MethodRegistry::with_defaults())).run(shutdown_rx),
    );

    tokio::select! {
        result = &mut client_task => {
            if let Err(e) = result? {
                error!(error = %e, "Peer stopped");
                return Err(e);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received");
            shutdown_tx.send_replace(true);
            client_task.await??;
        }
    }

    Ok(())
}
