//! Peer connections: transport seam, registry, and liveness sweeping.

pub mod registry;
pub mod sweeper;
pub mod transport;

pub use registry::{ConnectionRegistry, PeerHandle};
pub use sweeper::LivenessSweeper;
pub use transport::PeerTransport;
