//! Domain types for the bridge.
//!
//! Configuration, errors, identifiers, wire envelopes, and the correlation
//! table. Nothing here knows about sockets.

pub mod config;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod pending;

// Re-exports for convenience
pub use config::{BridgeConfig, CallConfig, ConfigError, TransportConfig};
pub use envelope::{EnvelopeCodec, Inbound, JsonCodec, RpcReply, RpcRequest};
pub use error::{BridgeError, BridgeResult, CodecError, ServiceError, TransportError};
pub use ids::{ConnectionId, RequestId};
pub use pending::{CorrelationTable, PeerReply, ReclaimReason, StatsSnapshot};
