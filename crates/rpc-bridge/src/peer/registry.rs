//! Connection registry: the set of peers currently connected.

use crate::domain::ids::ConnectionId;
use crate::peer::transport::PeerTransport;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared handle to a registered connection's transport
pub type PeerHandle = Arc<dyn PeerTransport>;

/// Tracks open peer connections by short opaque id.
///
/// `count()` reports registered entries, which may include connections that
/// died silently and have not been swept yet.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, PeerHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a connection under a fresh id.
    pub fn register(&self, transport: PeerHandle) -> ConnectionId {
        loop {
            let id = ConnectionId::generate();
            if let Entry::Vacant(entry) = self.connections.entry(id.clone()) {
                entry.insert(transport);
                info!(
                    connection_id = %id,
                    connected = self.connections.len(),
                    "Peer connected"
                );
                return id;
            }
        }
    }

    /// Remove a connection. Idempotent; returns whether an entry was removed.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        if self.connections.remove(id).is_some() {
            info!(
                connection_id = %id,
                connected = self.connections.len(),
                "Peer disconnected"
            );
            true
        } else {
            false
        }
    }

    /// First registered connection whose transport reports open.
    ///
    /// No fairness or affinity: iteration order is arbitrary.
    pub fn pick_any(&self) -> Option<(ConnectionId, PeerHandle)> {
        self.connections
            .iter()
            .find(|entry| entry.value().is_open())
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
    }

    /// Look up a connection by id
    pub fn get(&self, id: &ConnectionId) -> Option<PeerHandle> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of registered entries
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Ids of all registered entries
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }

    /// Unregister every entry whose transport reports closed.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let mut removed = 0;

        self.connections.retain(|id, transport| {
            if transport.is_open() {
                true
            } else {
                warn!(connection_id = %id, "Sweeping closed connection");
                removed += 1;
                false
            }
        });

        if removed > 0 {
            debug!(
                removed = removed,
                connected = self.connections.len(),
                "Swept dead connections"
            );
        }
        removed
    }
}
