//! WebSocket client that answers bridge requests, with reconnection.

use crate::methods::MethodRegistry;
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use rpc_bridge::{EnvelopeCodec, Inbound, JsonCodec};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Maximum consecutive reconnection attempts before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Fixed delay between reconnection attempts.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(3);

/// Interval between keepalive frames.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(25);

/// Text frame sent to keep the connection from idling out; the bridge
/// discards it.
pub const KEEPALIVE_FRAME: &str = r#"{"type":"heartbeat"}"#;

/// Client settings
#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub url: String,
    pub max_reconnect_attempts: u32,
    pub reconnect_interval: Duration,
    pub keepalive_interval: Duration,
}

impl PeerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            reconnect_interval: RECONNECT_INTERVAL,
            keepalive_interval: KEEPALIVE_INTERVAL,
        }
    }
}

/// How a single connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionEnd {
    Closed,
    Shutdown,
}

async fn stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Peer client
pub struct PeerClient {
    config: PeerConfig,
    methods: Arc<MethodRegistry>,
    codec: JsonCodec,
}

impl PeerClient {
    pub fn new(config: PeerConfig, methods: Arc<MethodRegistry>) -> Self {
        Self {
            config,
            methods,
            codec: JsonCodec::new(),
        }
    }

    /// Connect and serve until `shutdown` flips or reconnection gives up.
    ///
    /// The attempt counter resets whenever a connection is established.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut attempts = 0u32;

        loop {
            match self.run_connection(&mut shutdown, &mut attempts).await {
                Ok(ConnectionEnd::Shutdown) => return Ok(()),
                Ok(ConnectionEnd::Closed) => info!("Connection closed by bridge"),
                Err(e) => warn!(error = %e, "Connection failed"),
            }

            attempts += 1;
            if attempts >= self.config.max_reconnect_attempts {
                anyhow::bail!("giving up after {attempts} reconnection attempts");
            }

            info!(
                attempt = attempts,
                delay_ms = self.config.reconnect_interval.as_millis(),
                "Reconnecting"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.config.reconnect_interval) => {}
                _ = stopped(&mut shutdown) => return Ok(()),
            }
        }
    }

    async fn run_connection(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        attempts: &mut u32,
    ) -> Result<ConnectionEnd> {
        let (ws_stream, _) = connect_async(self.config.url.as_str())
            .await
            .with_context(|| format!("failed to connect to {}", self.config.url))?;
        *attempts = 0;
        info!(url = %self.config.url, methods = ?self.methods.names(), "Connected to bridge");

        let (mut write, mut read) = ws_stream.split();
        let period = self.config.keepalive_interval;
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text.to_string(),
                        Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                            Ok(text) => text,
                            Err(_) => continue,
                        },
                        Some(Ok(Message::Close(_))) | None => return Ok(ConnectionEnd::Closed),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e).context("read failed"),
                    };
                    if let Some(reply) = self.handle_frame(&text) {
                        write
                            .send(Message::Text(reply.into()))
                            .await
                            .context("failed to send reply")?;
                    }
                }
                _ = keepalive.tick() => {
                    write
                        .send(Message::Text(KEEPALIVE_FRAME.into()))
                        .await
                        .context("failed to send keepalive")?;
                }
                _ = stopped(shutdown) => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(ConnectionEnd::Shutdown);
                }
            }
        }
    }

    /// Decode one frame; requests produce an encoded reply.
    fn handle_frame(&self, text: &str) -> Option<String> {
        match self.codec.decode(text) {
            Ok(Inbound::Request(request)) => {
                debug!(
                    request_id = %request.id,
                    action = %request.action,
                    params = request.params.len(),
                    "Request from bridge"
                );
                let reply = self.methods.dispatch(&request);
                match self.codec.encode_reply(&reply) {
                    Ok(frame) => Some(frame),
                    Err(e) => {
                        warn!(request_id = %request.id, error = %e, "Failed to encode reply");
                        None
                    }
                }
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Failed to parse message");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpc_bridge::{BridgeConfig, BridgeService, RpcReply};
    use serde_json::json;
    use std::net::{IpAddr, Ipv4Addr};

    fn client(url: &str) -> PeerClient {
        PeerClient::new(PeerConfig::new(url), Arc::new(MethodRegistry::with_defaults()))
    }

    #[test]
    fn test_handle_frame_answers_requests_only() {
        let client = client("ws://unused");

        let reply = client
            .handle_frame(r#"{"id":"r1","action":"addSafe","params":[1,2]}"#)
            .unwrap();
        let reply: RpcReply = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.result, json!(3));

        assert!(client.handle_frame(r#"{"callbackId":"x","status":200}"#).is_none());
        assert!(client.handle_frame("not json").is_none());
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let mut config = PeerConfig::new("ws://127.0.0.1:9/ws");
        config.max_reconnect_attempts = 2;
        config.reconnect_interval = Duration::from_millis(10);
        let client = PeerClient::new(config, Arc::new(MethodRegistry::new()));

        let (_tx, rx) = watch::channel(false);
        assert!(client.run(rx).await.is_err());
    }

    #[tokio::test]
    async fn test_serves_bridge_calls() {
        let mut bridge_config = BridgeConfig::default();
        bridge_config.server.host = IpAddr::V4(Ipv4Addr::LOCALHOST);
        bridge_config.server.port = 0;
        let mut service = BridgeService::new(bridge_config).unwrap();
        let addr = service.start().await.unwrap();

        let (tx, rx) = watch::channel(false);
        let peer = tokio::spawn(client(&format!("ws://{addr}/ws")).run(rx));

        let engine = service.engine();
        tokio::time::timeout(Duration::from_secs(5), async {
            while engine.connected_count() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let methods = engine.registered_methods().await.unwrap();
        assert_eq!(methods, vec!["addSafe", "base64", "echo"]);

        let encoded = engine
            .invoke("base64", vec![json!("Hello from Burp via HTTP!")])
            .await
            .unwrap();
        assert_eq!(encoded, json!("SGVsbG8gZnJvbSBCdXJwIHZpYSBIVFRQIQ=="));

        let reply = engine.call("missing", vec![]).await.unwrap();
        assert_eq!(reply.status, 404);

        tx.send(true).unwrap();
        peer.await.unwrap().unwrap();
        service.shutdown().await;
    }
}
