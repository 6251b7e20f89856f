//! WebSocket connection handler for peers.
//!
//! Each accepted socket is split: the write half becomes a `WsTransport` in
//! the registry, the read half is drained here and every frame is routed
//! through the engine. The connection is unregistered when the loop ends,
//! whatever the reason.

use crate::domain::config::TransportConfig;
use crate::domain::ids::ConnectionId;
use crate::engine::{shutdown_requested, RouteOutcome, RpcEngine};
use crate::peer::transport::PeerTransport;
use crate::ws::transport::WsTransport;
use axum::extract::ws::{Message, WebSocket};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a connection loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// Peer sent a close frame or the stream ended
    Closed,
    /// Read error on the socket
    Error,
    /// No frame within the idle timeout
    Idle,
    /// Bridge shutting down
    Shutdown,
}

/// WebSocket connection handler
pub struct WebSocketHandler {
    engine: Arc<RpcEngine>,
    config: TransportConfig,
}

impl WebSocketHandler {
    pub fn new(engine: Arc<RpcEngine>, config: TransportConfig) -> Self {
        Self { engine, config }
    }

    /// Handle a WebSocket connection until it ends
    pub async fn handle(self, socket: WebSocket) -> Disconnect {
        let (sink, mut stream) = socket.split();
        let transport = Arc::new(WsTransport::new(sink, &self.config));
        let connection_id = self.engine.registry().register(transport.clone());
        let mut shutdown = self.engine.shutdown_signal();

        let reason = loop {
            let next = tokio::select! {
                next = tokio::time::timeout(self.config.idle_timeout, stream.next()) => next,
                _ = shutdown_requested(&mut shutdown) => break Disconnect::Shutdown,
            };

            let message = match next {
                Err(_) => {
                    info!(
                        connection_id = %connection_id,
                        idle_ms = self.config.idle_timeout.as_millis(),
                        "WebSocket idle timeout"
                    );
                    break Disconnect::Idle;
                }
                Ok(None) => break Disconnect::Closed,
                Ok(Some(Err(e))) => {
                    warn!(connection_id = %connection_id, error = %e, "WebSocket read error");
                    break Disconnect::Error;
                }
                Ok(Some(Ok(message))) => message,
            };

            match message {
                Message::Text(text) => {
                    self.handle_frame(&connection_id, &text);
                }
                Message::Binary(data) => match String::from_utf8(data) {
                    Ok(text) => {
                        self.handle_frame(&connection_id, &text);
                    }
                    Err(_) => {
                        debug!(connection_id = %connection_id, "Discarding non-UTF-8 binary frame");
                    }
                },
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(frame) => {
                    debug!(connection_id = %connection_id, frame = ?frame, "Peer sent close");
                    break Disconnect::Closed;
                }
            }
        };

        transport.mark_closed();
        if reason != Disconnect::Closed {
            transport.close().await;
        }
        self.engine.registry().unregister(&connection_id);

        info!(
            connection_id = %connection_id,
            reason = ?reason,
            "WebSocket connection ended"
        );
        reason
    }

    /// Size-check one inbound text frame and route it
    fn handle_frame(&self, connection_id: &ConnectionId, text: &str) -> Option<RouteOutcome> {
        if text.len() > self.config.max_message_size {
            warn!(
                connection_id = %connection_id,
                size = text.len(),
                max = self.config.max_message_size,
                "Inbound frame exceeds size limit, dropping"
            );
            return None;
        }
        Some(self.engine.route_inbound(connection_id, text))
    }
}
