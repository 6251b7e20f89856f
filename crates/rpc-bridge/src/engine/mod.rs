//! RPC engine: blocking calls to whichever peer is connected.
//!
//! `invoke` picks an open connection, registers a slot in the correlation
//! table, sends the encoded request, and waits for the correlated reply up to
//! an adaptive deadline. Inbound frames come back through `route_inbound`.

pub mod routing;

use crate::domain::config::CallConfig;
use crate::domain::envelope::{EnvelopeCodec, JsonCodec, RpcRequest};
use crate::domain::error::{BridgeError, BridgeResult};
use crate::domain::ids::RequestId;
use crate::domain::pending::{CorrelationTable, PeerReply, ReclaimReason};
use crate::peer::registry::ConnectionRegistry;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub use routing::{LoggingRequestHandler, PeerRequestHandler, RouteOutcome};

/// Action peers answer with a comma-separated list of their method names
pub const REGISTERED_METHODS_ACTION: &str = "getRegisteredMethods";

/// Reclaims the slot if the waiting future is dropped before it finishes.
struct SlotGuard<'a> {
    table: &'a CorrelationTable,
    request_id: &'a RequestId,
    armed: bool,
}

impl SlotGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.table.reclaim(self.request_id, ReclaimReason::Cancelled);
        }
    }
}

/// Correlated request/response engine.
pub struct RpcEngine {
    registry: Arc<ConnectionRegistry>,
    table: Arc<CorrelationTable>,
    codec: Arc<dyn EnvelopeCodec>,
    config: CallConfig,
    request_handler: Option<Arc<dyn PeerRequestHandler>>,
    shutdown_tx: watch::Sender<bool>,
}

impl RpcEngine {
    pub fn new(registry: Arc<ConnectionRegistry>, config: CallConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            registry,
            table: Arc::new(CorrelationTable::new()),
            codec: Arc::new(JsonCodec::new()),
            config,
            request_handler: None,
            shutdown_tx,
        }
    }

    /// Replace the envelope codec
    pub fn with_codec(mut self, codec: Arc<dyn EnvelopeCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Install a handler for peer-initiated requests
    pub fn with_request_handler(mut self, handler: Arc<dyn PeerRequestHandler>) -> Self {
        self.request_handler = Some(handler);
        self
    }

    /// Invoke `action` on a connected peer and return its result value.
    pub async fn invoke(&self, action: &str, args: Vec<Value>) -> BridgeResult<Value> {
        self.call(action, args).await.map(|reply| reply.result)
    }

    /// Invoke `action` and return the full reply, status included.
    pub async fn call(&self, action: &str, args: Vec<Value>) -> BridgeResult<PeerReply> {
        let mut shutdown = self.shutdown_tx.subscribe();
        if *shutdown.borrow() {
            return Err(BridgeError::Cancelled {
                action: action.to_string(),
            });
        }

        let (connection_id, transport) = self
            .registry
            .pick_any()
            .ok_or(BridgeError::NoPeerAvailable)?;

        let deadline = self.deadline_for(&args);
        let arg_count = args.len();
        let request = RpcRequest::new(RequestId::generate(), action, args);
        let frame = self
            .codec
            .encode(&request)
            .map_err(|e| BridgeError::Encode(e.to_string()))?;

        if frame.len() > self.config.max_payload_size {
            warn!(
                action = action,
                size = frame.len(),
                max = self.config.max_payload_size,
                "Request exceeds payload limit"
            );
            return Err(BridgeError::PayloadTooLarge {
                size: frame.len(),
                max: self.config.max_payload_size,
            });
        }

        let request_id = request.id;
        let frame_len = frame.len();
        let mut slot = self.table.begin(request_id.clone(), action)?;
        let mut guard = SlotGuard {
            table: &self.table,
            request_id: &request_id,
            armed: true,
        };

        if let Err(e) = transport.send_text(frame).await {
            guard.disarm();
            self.table.reclaim(&request_id, ReclaimReason::SendFailed);
            error!(
                connection_id = %connection_id,
                request_id = %request_id,
                action = action,
                error = %e,
                "Failed to send request"
            );
            return Err(BridgeError::SendFailed(e));
        }

        debug!(
            connection_id = %connection_id,
            request_id = %request_id,
            action = action,
            params = arg_count,
            size = frame_len,
            timeout_ms = deadline.as_millis(),
            "Sent request"
        );

        let stopped = tokio::select! {
            waited = tokio::time::timeout(deadline, &mut slot) => match waited {
                Ok(received) => {
                    guard.disarm();
                    return received.map_err(|_| BridgeError::Cancelled {
                        action: action.to_string(),
                    });
                }
                Err(_) => ReclaimReason::Timeout,
            },
            _ = shutdown_requested(&mut shutdown) => ReclaimReason::Cancelled,
        };

        guard.disarm();
        if !self.table.reclaim(&request_id, stopped) {
            // A reply (or a drain) removed the entry first; the slot holds
            // the outcome, or is about to
            debug!(request_id = %request_id, action = action, "Reply won the race against the deadline");
            return slot.await.map_err(|_| BridgeError::Cancelled {
                action: action.to_string(),
            });
        }

        if stopped == ReclaimReason::Cancelled {
            info!(request_id = %request_id, action = action, "Call cancelled by shutdown");
            return Err(BridgeError::Cancelled {
                action: action.to_string(),
            });
        }

        warn!(
            connection_id = %connection_id,
            request_id = %request_id,
            action = action,
            timeout_ms = deadline.as_millis(),
            "Call timed out"
        );
        Err(BridgeError::Timeout {
            action: action.to_string(),
            after: deadline,
        })
    }

    /// Method names the connected peer registered, via `getRegisteredMethods`.
    pub async fn registered_methods(&self) -> BridgeResult<Vec<String>> {
        let result = self.invoke(REGISTERED_METHODS_ACTION, Vec::new()).await?;
        Ok(split_method_list(&result))
    }

    /// Deadline for a call: bulk timeout when any string argument is longer
    /// than the configured threshold.
    pub fn deadline_for(&self, args: &[Value]) -> Duration {
        let threshold = self.config.bulk_arg_threshold;
        let bulk = args.iter().any(|arg| match arg {
            Value::String(s) => s.chars().count() > threshold,
            _ => false,
        });

        if bulk {
            self.config.bulk_timeout
        } else {
            self.config.base_timeout
        }
    }

    /// Stop accepting calls and release everyone currently waiting.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let released = self.table.drain();
        if released > 0 {
            info!(released = released, "Released pending calls on shutdown");
        }
    }

    /// Receiver that flips to true on `shutdown()`
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn table(&self) -> &Arc<CorrelationTable> {
        &self.table
    }

    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    /// Number of registered peer connections
    pub fn connected_count(&self) -> usize {
        self.registry.count()
    }
}

/// Resolves once `rx` reports shutdown (or its sender is gone).
pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Split a `getRegisteredMethods` result on commas.
///
/// An empty string or a non-string result yields no methods; trailing empty
/// segments are dropped.
pub fn split_method_list(result: &Value) -> Vec<String> {
    let Some(list) = result.as_str() else {
        return Vec::new();
    };

    let mut methods: Vec<String> = list.split(',').map(str::to_string).collect();
    while methods.last().is_some_and(|m| m.is_empty()) {
        methods.pop();
    }
    methods
}
