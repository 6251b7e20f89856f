//! Command-line arguments and their mapping onto `BridgeConfig`.

use clap::Parser;
use rpc_bridge::BridgeConfig;
use std::net::IpAddr;
use std::time::Duration;

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

#[derive(Parser, Debug)]
#[command(name = "bridge-runtime")]
#[command(about = "WebSocket RPC bridge with an HTTP control plane")]
#[command(version)]
pub struct Args {
    /// Address to bind
    #[arg(long, env = "BRIDGE_HOST")]
    pub host: Option<IpAddr>,

    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, env = "BRIDGE_PORT")]
    pub port: Option<u16>,

    /// Path peers connect to
    #[arg(long, env = "BRIDGE_WS_PATH")]
    pub ws_path: Option<String>,

    /// Prefix for the control-plane routes
    #[arg(long, env = "BRIDGE_API_PREFIX")]
    pub api_prefix: Option<String>,

    /// Max message size in bytes, both directions
    #[arg(long, env = "BRIDGE_MAX_MESSAGE_SIZE")]
    pub max_message_size: Option<usize>,

    /// Default wait for a reply, e.g. "30s"
    #[arg(long, env = "BRIDGE_CALL_TIMEOUT", value_parser = parse_duration)]
    pub call_timeout: Option<Duration>,

    /// Wait for a reply when any string argument is large, e.g. "60s"
    #[arg(long, env = "BRIDGE_BULK_TIMEOUT", value_parser = parse_duration)]
    pub bulk_timeout: Option<Duration>,

    /// Liveness sweep interval, e.g. "30s"
    #[arg(long, env = "BRIDGE_SWEEP_INTERVAL", value_parser = parse_duration)]
    pub sweep_interval: Option<Duration>,

    /// Close peers that send nothing for this long, e.g. "5m"
    #[arg(long, env = "BRIDGE_IDLE_TIMEOUT", value_parser = parse_duration)]
    pub idle_timeout: Option<Duration>,

    /// Disable CORS headers on the control plane
    #[arg(long, env = "BRIDGE_NO_CORS")]
    pub no_cors: bool,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "BRIDGE_JSON_LOGS")]
    pub json_logs: bool,
}

impl Args {
    /// Overlay the given flags on the default configuration
    pub fn into_config(self) -> BridgeConfig {
        let mut config = BridgeConfig::default();

        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(ws_path) = self.ws_path {
            config.server.ws_path = ws_path;
        }
        if let Some(api_prefix) = self.api_prefix {
            config.server.api_prefix = api_prefix;
        }
        if let Some(size) = self.max_message_size {
            config.transport.max_message_size = size;
            config.calls.max_payload_size = size;
        }
        if let Some(timeout) = self.call_timeout {
            config.calls.base_timeout = timeout;
            // Keep the bulk deadline at least as long as the base one
            if config.calls.bulk_timeout < timeout {
                config.calls.bulk_timeout = timeout;
            }
        }
        if let Some(timeout) = self.bulk_timeout {
            config.calls.bulk_timeout = timeout;
        }
        if let Some(interval) = self.sweep_interval {
            config.sweeper.interval = interval;
        }
        if let Some(idle) = self.idle_timeout {
            config.transport.idle_timeout = idle;
        }
        if self.no_cors {
            config.cors.enabled = false;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_bridge_defaults() {
        let config = Args::parse_from(["bridge-runtime"]).into_config();
        assert_eq!(config.server.port, 10087);
        assert_eq!(config.calls.base_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flags_override_config() {
        let config = Args::parse_from([
            "bridge-runtime",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--call-timeout",
            "90s",
            "--sweep-interval",
            "5s",
            "--max-message-size",
            "1024",
            "--no-cors",
        ])
        .into_config();

        assert_eq!(config.bind_addr().to_string(), "127.0.0.1:9000");
        assert_eq!(config.calls.base_timeout, Duration::from_secs(90));
        assert_eq!(config.calls.bulk_timeout, Duration::from_secs(90));
        assert_eq!(config.sweeper.interval, Duration::from_secs(5));
        assert_eq!(config.transport.max_message_size, 1024);
        assert!(!config.cors.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_duration_rejected() {
        let parsed = Args::try_parse_from(["bridge-runtime", "--call-timeout", "soon"]);
        assert!(parsed.is_err());
    }
}
