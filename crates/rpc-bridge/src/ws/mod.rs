//! WebSocket endpoint peers connect to.

pub mod handler;
pub mod transport;

pub use handler::{Disconnect, WebSocketHandler};
pub use transport::WsTransport;

use crate::engine::RpcEngine;
use crate::domain::config::TransportConfig;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::Response;
use std::sync::Arc;

/// State for the upgrade route
#[derive(Clone)]
pub struct WsState {
    pub engine: Arc<RpcEngine>,
    pub config: TransportConfig,
}

/// Upgrade handler; message and frame limits apply before any routing
pub async fn ws_upgrade(State(state): State<WsState>, ws: WebSocketUpgrade) -> Response {
    let limit = state.config.max_message_size;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| async move {
            WebSocketHandler::new(state.engine, state.config)
                .handle(socket)
                .await;
        })
}
