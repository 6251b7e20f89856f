//! Bridge service: one listener serving the peer WebSocket and the control
//! plane, plus the liveness sweeper.

use crate::control;
use crate::domain::config::BridgeConfig;
use crate::domain::error::ServiceError;
use crate::engine::{shutdown_requested, PeerRequestHandler, RpcEngine};
use crate::middleware::{create_cors_layer, TracingLayer};
use crate::peer::registry::ConnectionRegistry;
use crate::peer::sweeper::LivenessSweeper;
use crate::ws::{ws_upgrade, WsState};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Bridge service state
pub struct BridgeService {
    config: BridgeConfig,
    engine: Arc<RpcEngine>,
    server_handle: Option<JoinHandle<()>>,
    sweeper_handle: Option<JoinHandle<()>>,
}

impl BridgeService {
    /// Create a service with no peer-request handler
    pub fn new(config: BridgeConfig) -> Result<Self, ServiceError> {
        Self::build(config, None)
    }

    /// Create a service that hands peer-initiated requests to `handler`
    pub fn with_request_handler(
        config: BridgeConfig,
        handler: Arc<dyn PeerRequestHandler>,
    ) -> Result<Self, ServiceError> {
        Self::build(config, Some(handler))
    }

    fn build(
        config: BridgeConfig,
        handler: Option<Arc<dyn PeerRequestHandler>>,
    ) -> Result<Self, ServiceError> {
        config.validate()?;

        let registry = Arc::new(ConnectionRegistry::new());
        let mut engine = RpcEngine::new(registry, config.calls.clone());
        if let Some(handler) = handler {
            engine = engine.with_request_handler(handler);
        }

        Ok(Self {
            config,
            engine: Arc::new(engine),
            server_handle: None,
            sweeper_handle: None,
        })
    }

    /// Bind, start serving, and start the sweeper. Returns the bound address
    /// (useful when the configured port is 0).
    pub async fn start(&mut self) -> Result<SocketAddr, ServiceError> {
        if self.server_handle.is_some() {
            return Err(ServiceError::AlreadyStarted);
        }

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr())
            .await
            .map_err(|e| ServiceError::Bind(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServiceError::Bind(e.to_string()))?;

        let router = self.build_router();
        let mut shutdown = self.engine.shutdown_signal();
        self.server_handle = Some(tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown_requested(&mut shutdown).await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "Bridge server error");
            }
        }));

        let sweeper = LivenessSweeper::new(
            Arc::clone(self.engine.registry()),
            self.config.sweeper.interval,
        );
        self.sweeper_handle = Some(sweeper.spawn(self.engine.shutdown_signal()));

        info!(
            addr = %local_addr,
            ws_path = %self.config.server.ws_path,
            api_prefix = %self.config.server.api_prefix,
            "Bridge listening"
        );
        Ok(local_addr)
    }

    /// Signal shutdown and wait for the server and sweeper to stop.
    ///
    /// Pending calls resolve as cancelled, and new calls fail immediately.
    pub async fn shutdown(&mut self) {
        info!("Shutting down bridge");
        self.engine.shutdown();

        if let Some(handle) = self.server_handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Server task failed");
            }
        }
        if let Some(handle) = self.sweeper_handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Sweeper task failed");
            }
        }
        info!("Bridge stopped");
    }

    /// Engine handle for in-process callers
    pub fn engine(&self) -> Arc<RpcEngine> {
        Arc::clone(&self.engine)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn build_router(&self) -> Router {
        let ws_state = WsState {
            engine: Arc::clone(&self.engine),
            config: self.config.transport.clone(),
        };
        let ws_router = Router::new()
            .route(&self.config.server.ws_path, get(ws_upgrade))
            .with_state(ws_state);

        let mut api = control::api_router(Arc::clone(&self.engine));
        if let Some(cors) = create_cors_layer(&self.config.cors) {
            api = api.layer(cors);
        }

        Router::new()
            .nest(&self.config.server.api_prefix, api)
            .merge(control::health_router(Arc::clone(&self.engine)))
            .layer(TracingLayer::new())
            .merge(ws_router)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::BridgeError;
    use std::net::{IpAddr, Ipv4Addr};

    fn local_config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.server.host = IpAddr::V4(Ipv4Addr::LOCALHOST);
        config.server.port = 0;
        config
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = local_config();
        config.calls.max_payload_size = 0;
        assert!(matches!(
            BridgeService::new(config),
            Err(ServiceError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let mut service = BridgeService::new(local_config()).unwrap();
        service.start().await.unwrap();
        assert!(matches!(
            service.start().await,
            Err(ServiceError::AlreadyStarted)
        ));
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_calls() {
        let mut service = BridgeService::new(local_config()).unwrap();
        let addr = service.start().await.unwrap();
        assert_ne!(addr.port(), 0);

        let engine = service.engine();
        service.shutdown().await;

        assert!(engine.is_shut_down());
        let err = engine.invoke("echo", vec![]).await.unwrap_err();
        assert!(matches!(err, BridgeError::Cancelled { .. }));
    }
}
