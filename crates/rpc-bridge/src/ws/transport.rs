//! `PeerTransport` over the write half of an axum WebSocket.

use crate::domain::config::TransportConfig;
use crate::domain::error::TransportError;
use crate::peer::transport::PeerTransport;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Outbound half of one peer connection.
///
/// Sends are serialized through the mutex. A failed or timed-out send marks
/// the transport closed so the registry stops handing it out.
pub struct WsTransport {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    open: AtomicBool,
    send_timeout: Duration,
    max_message_size: usize,
}

impl WsTransport {
    pub fn new(sink: SplitSink<WebSocket, Message>, config: &TransportConfig) -> Self {
        Self {
            sink: Mutex::new(sink),
            open: AtomicBool::new(true),
            send_timeout: config.send_timeout,
            max_message_size: config.max_message_size,
        }
    }

    /// Flag the transport closed without touching the socket
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }
}

#[async_trait]
impl PeerTransport for WsTransport {
    async fn send_text(&self, frame: String) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        if frame.len() > self.max_message_size {
            return Err(TransportError::FrameTooLarge {
                size: frame.len(),
                max: self.max_message_size,
            });
        }

        let send = async {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Text(frame)).await
        };

        match tokio::time::timeout(self.send_timeout, send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.mark_closed();
                Err(TransportError::Io(e.to_string()))
            }
            Err(_) => {
                self.mark_closed();
                Err(TransportError::SendTimeout(self.send_timeout))
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn close(&self) {
        self.mark_closed();
        let close = async {
            let mut sink = self.sink.lock().await;
            if let Err(e) = sink.send(Message::Close(None)).await {
                debug!(error = %e, "Close frame not sent");
            }
            let _ = sink.close().await;
        };
        if tokio::time::timeout(self.send_timeout, close).await.is_err() {
            debug!("Close timed out");
        }
    }
}
