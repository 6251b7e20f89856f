//! Transport seam between the registry and a concrete duplex channel.

use crate::domain::error::TransportError;
use async_trait::async_trait;

/// A message-framed duplex connection to one peer.
///
/// Implementations enforce their own size limits and send timeouts; the
/// engine only sees success or a `TransportError`.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Send one text frame
    async fn send_text(&self, frame: String) -> Result<(), TransportError>;

    /// Whether the underlying connection still reports itself open
    fn is_open(&self) -> bool;

    /// Close the connection; later sends fail
    async fn close(&self);
}

/// In-memory transport for testing
pub mod channel {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;

    /// Transport whose outbound frames land in an unbounded channel
    pub struct ChannelTransport {
        tx: mpsc::UnboundedSender<String>,
        open: AtomicBool,
    }

    impl ChannelTransport {
        /// Create a transport and the receiver observing its outbound frames
        pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Self {
                    tx,
                    open: AtomicBool::new(true),
                },
                rx,
            )
        }

        /// Flip the open flag without notifying anyone, as a silently dead
        /// socket would
        pub fn set_open(&self, open: bool) {
            self.open.store(open, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl PeerTransport for ChannelTransport {
        async fn send_text(&self, frame: String) -> Result<(), TransportError> {
            if !self.is_open() {
                return Err(TransportError::Closed);
            }
            self.tx.send(frame).map_err(|_| TransportError::Closed)
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        async fn close(&self) {
            self.set_open(false);
        }
    }
}
