//! RPC Bridge - blocking request/response calls into code running inside
//! WebSocket peers.
//!
//! Peers connect over WebSocket and register methods on their side. The
//! bridge picks a connected peer, sends a correlated request envelope, and
//! blocks the caller until the matching reply arrives or the deadline passes.
//!
//! # Architecture
//!
//! ```text
//!  HTTP control plane (/api/rpc/*)        in-process callers
//!               │                                │
//!               └──────────────┬─────────────────┘
//!                              ▼
//!                  ┌───────────────────────┐
//!                  │       RpcEngine       │── route_inbound ◄── reader loops
//!                  │  invoke / deadlines   │
//!                  └───┬──────────────┬────┘
//!                      │              │
//!           ┌──────────▼───┐   ┌──────▼────────────┐
//!           │  Connection  │   │ Correlation Table │
//!           │   Registry   │   │ (oneshot slots)   │
//!           └──────┬───────┘   └───────────────────┘
//!                  │ sweep every 30s
//!           ┌──────▼───────┐
//!           │   Liveness   │
//!           │   Sweeper    │
//!           └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use rpc_bridge::{BridgeConfig, BridgeService};
//!
//! let mut service = BridgeService::new(BridgeConfig::default())?;
//! let addr = service.start().await?;
//! let result = service.engine().invoke("base64", vec!["hello".into()]).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod control;
pub mod domain;
pub mod engine;
pub mod middleware;
pub mod peer;
pub mod service;
pub mod ws;

// Re-exports for public API
pub use domain::config::BridgeConfig;
pub use domain::envelope::{EnvelopeCodec, Inbound, JsonCodec, RpcReply, RpcRequest};
pub use domain::error::{BridgeError, BridgeResult, ServiceError, TransportError};
pub use domain::ids::{ConnectionId, RequestId};
pub use domain::pending::{CorrelationTable, PeerReply, StatsSnapshot};
pub use engine::{
    split_method_list, LoggingRequestHandler, PeerRequestHandler, RouteOutcome, RpcEngine,
    REGISTERED_METHODS_ACTION,
};
pub use peer::{ConnectionRegistry, LivenessSweeper, PeerTransport};
pub use service::BridgeService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
