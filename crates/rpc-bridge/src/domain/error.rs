//! Bridge error types.
//!
//! `BridgeError` is what `RpcEngine::invoke` hands back to its caller. Each
//! kind carries a stable machine code and an HTTP status so the control plane
//! can report it distinctly instead of as a generic internal error.

use crate::domain::ids::RequestId;
use std::time::Duration;

/// Stable machine-readable error codes surfaced by the control plane
pub mod codes {
    pub const NO_PEER_AVAILABLE: &str = "NO_PEER_AVAILABLE";
    pub const PAYLOAD_TOO_LARGE: &str = "PAYLOAD_TOO_LARGE";
    pub const SEND_FAILED: &str = "SEND_FAILED";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const CANCELLED: &str = "CANCELLED";
    pub const ENCODE_FAILED: &str = "ENCODE_FAILED";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const INTERNAL: &str = "INTERNAL";
}

/// Failure of a single `invoke` call.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Registry empty, or every registered connection already closed
    #[error("no peer available: no open WebSocket connection")]
    NoPeerAvailable,

    /// Encoded request exceeds the configured maximum; nothing was sent
    #[error("payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Transport refused or failed the send
    #[error("send failed: {0}")]
    SendFailed(#[from] TransportError),

    /// Deadline elapsed before a reply arrived
    #[error("timed out after {} waiting for reply to '{action}'", format_deadline(.after))]
    Timeout { action: String, after: Duration },

    /// Caller stopped waiting (service shutdown)
    #[error("call cancelled while waiting for reply to '{action}'")]
    Cancelled { action: String },

    /// Request could not be serialized
    #[error("failed to encode request: {0}")]
    Encode(String),

    /// Correlation table invariant violated (request id collision)
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
}

impl BridgeError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::NoPeerAvailable => codes::NO_PEER_AVAILABLE,
            BridgeError::PayloadTooLarge { .. } => codes::PAYLOAD_TOO_LARGE,
            BridgeError::SendFailed(_) => codes::SEND_FAILED,
            BridgeError::Timeout { .. } => codes::TIMEOUT,
            BridgeError::Cancelled { .. } => codes::CANCELLED,
            BridgeError::Encode(_) => codes::ENCODE_FAILED,
            BridgeError::Correlation(_) => codes::INTERNAL,
        }
    }

    /// HTTP status the control plane answers with
    pub fn http_status(&self) -> u16 {
        match self {
            BridgeError::NoPeerAvailable => 503,
            BridgeError::PayloadTooLarge { .. } => 413,
            BridgeError::SendFailed(_) => 502,
            BridgeError::Timeout { .. } => 504,
            BridgeError::Cancelled { .. } => 503,
            BridgeError::Encode(_) | BridgeError::Correlation(_) => 500,
        }
    }
}

fn format_deadline(after: &Duration) -> humantime_serde::re::humantime::FormattedDuration {
    humantime_serde::re::humantime::format_duration(*after)
}

/// Result type for engine operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Transport-level failure on a single connection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("send timed out after {}ms", .0.as_millis())]
    SendTimeout(Duration),
    #[error("frame of {size} bytes exceeds transport limit of {max}")]
    FrameTooLarge { size: usize, max: usize },
    #[error("transport error: {0}")]
    Io(String),
}

/// Inbound frame could not be decoded as an envelope.
///
/// Never surfaced to an `invoke` caller; the routing path logs and discards.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("encode error: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::MalformedMessage(e.to_string())
    }
}

/// Correlation table invariant violation.
#[derive(Debug, thiserror::Error)]
pub enum CorrelationError {
    #[error("request id {0} is already pending")]
    DuplicateRequestId(RequestId),
}

/// Service-level errors (not tied to a single call)
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::domain::config::ConfigError),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// Service already started
    #[error("service already started")]
    AlreadyStarted,
}
