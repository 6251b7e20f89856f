//! Bridge configuration with validation.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default port the bridge listens on (HTTP control plane and `/ws`)
pub const DEFAULT_PORT: u16 = 10087;

/// Default maximum message size in both directions (10 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Main bridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listener configuration
    pub server: ServerConfig,
    /// WebSocket transport limits
    pub transport: TransportConfig,
    /// Call deadlines and payload limits
    pub calls: CallConfig,
    /// Liveness sweeper
    pub sweeper: SweeperConfig,
    /// CORS configuration for the control plane
    pub cors: CorsConfig,
}

impl BridgeConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.server.ws_path.starts_with('/') {
            return Err(ConfigError::InvalidPath(self.server.ws_path.clone()));
        }
        let prefix = &self.server.api_prefix;
        if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
            return Err(ConfigError::InvalidPath(self.server.api_prefix.clone()));
        }

        if self.transport.max_message_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_message_size cannot be 0".into(),
            ));
        }
        if self.calls.max_payload_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_payload_size cannot be 0".into(),
            ));
        }

        if self.calls.base_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "base_timeout cannot be 0".into(),
            ));
        }
        if self.calls.bulk_timeout < self.calls.base_timeout {
            return Err(ConfigError::InvalidTimeout(
                "bulk_timeout cannot be shorter than base_timeout".into(),
            ));
        }
        if self.transport.send_timeout.is_zero() || self.transport.idle_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "transport timeouts cannot be 0".into(),
            ));
        }

        if self.sweeper.interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "sweeper interval cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Get server bind address
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 10087)
    pub port: u16,
    /// Path peers connect to
    pub ws_path: String,
    /// Prefix of the control-plane routes
    pub api_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: DEFAULT_PORT,
            ws_path: "/ws".to_string(),
            api_prefix: "/api/rpc".to_string(),
        }
    }
}

/// WebSocket transport limits, enforced by the transport adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Max size of a single message, both directions
    pub max_message_size: usize,
    /// Close a connection that delivers no frame for this long
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// Bound on a single outbound send
    #[serde(with = "humantime_serde")]
    pub send_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            idle_timeout: Duration::from_secs(5 * 60),
            send_timeout: Duration::from_secs(30),
        }
    }
}

/// Call deadlines and payload limits used by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Max encoded request size in bytes
    pub max_payload_size: usize,
    /// Deadline for an ordinary call
    #[serde(with = "humantime_serde")]
    pub base_timeout: Duration,
    /// Deadline when any string argument exceeds `bulk_arg_threshold`
    #[serde(with = "humantime_serde")]
    pub bulk_timeout: Duration,
    /// String argument length (in characters) that selects `bulk_timeout`
    pub bulk_arg_threshold: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_MESSAGE_SIZE,
            base_timeout: Duration::from_secs(30),
            bulk_timeout: Duration::from_secs(60),
            bulk_arg_threshold: 10_000,
        }
    }
}

/// Liveness sweeper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Enable CORS handling
    pub enabled: bool,
    /// Allowed origins (`*` for any)
    pub allowed_origins: Vec<String>,
    /// Max age for preflight cache in seconds
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            max_age: 3600,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("invalid path '{0}': must start with '/'")]
    InvalidPath(String),
}
