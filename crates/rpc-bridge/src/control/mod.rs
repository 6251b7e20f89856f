//! HTTP control plane: trigger calls and inspect connected peers.

pub mod error;
pub mod handlers;

pub use error::ControlError;

use crate::engine::RpcEngine;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

/// Shared state for control-plane handlers
#[derive(Clone)]
pub struct ControlState {
    pub engine: Arc<RpcEngine>,
}

/// Routes mounted under the API prefix (`/api/rpc` by default)
pub fn api_router(engine: Arc<RpcEngine>) -> Router {
    Router::new()
        .route("/call", post(handlers::call_action))
        .route("/clients", get(handlers::clients))
        .route("/methods", get(handlers::methods))
        .route("/test", get(handlers::smoke_test))
        .route("/pending", get(handlers::pending))
        .with_state(ControlState { engine })
}

/// `/health` lives outside the API prefix
pub fn health_router(engine: Arc<RpcEngine>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .with_state(ControlState { engine })
}
