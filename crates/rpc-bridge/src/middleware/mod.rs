//! HTTP middleware for the control plane.

pub mod cors;
pub mod tracing;

pub use cors::create_cors_layer;
pub use tracing::TracingLayer;
