//! Control-plane handlers.

use crate::control::{ControlError, ControlState};
use crate::domain::pending::StatsSnapshot;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

/// Input the smoke test sends to the peer's `base64` method
pub const SMOKE_BASE64_INPUT: &str = "Hello from Burp via HTTP!";

/// Body of `POST /call`
#[derive(Debug, Deserialize)]
pub struct CallRequest {
    #[serde(default)]
    pub action: Option<String>,
    /// Array of arguments; a bare value is sent as the only argument
    #[serde(default)]
    pub params: Option<Value>,
}

fn params_to_args(params: Option<Value>) -> Vec<Value> {
    match params {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(args)) => args,
        Some(single) => vec![single],
    }
}

/// `POST /call`: invoke an action on a connected peer
pub async fn call_action(
    State(state): State<ControlState>,
    body: Result<Json<CallRequest>, JsonRejection>,
) -> Result<Json<Value>, ControlError> {
    let Json(request) = body.map_err(|e| ControlError::invalid_request(e.body_text()))?;
    let action = request
        .action
        .filter(|action| !action.trim().is_empty())
        .ok_or_else(|| ControlError::invalid_request("missing required field 'action'"))?;
    let args = params_to_args(request.params);

    info!(action = %action, params = args.len(), "Control call");

    match state.engine.call(&action, args).await {
        Ok(reply) => Ok(Json(json!({
            "success": true,
            "action": action,
            "status": reply.status,
            "result": reply.result,
        }))),
        Err(e) => {
            warn!(action = %action, error = %e, "Control call failed");
            Err(e.into())
        }
    }
}

/// `GET /clients`
pub async fn clients(State(state): State<ControlState>) -> Json<Value> {
    let count = state.engine.connected_count();
    Json(json!({
        "clientCount": count,
        "connected": count > 0,
    }))
}

/// `GET /methods`: ask the peer which methods it registered
pub async fn methods(State(state): State<ControlState>) -> Result<Json<Value>, ControlError> {
    let client_count = state.engine.connected_count();
    if client_count == 0 {
        return Ok(Json(json!({
            "success": false,
            "clientCount": 0,
            "methods": [],
            "count": 0,
            "message": "no peer connected",
        })));
    }

    let methods = state.engine.registered_methods().await?;
    Ok(Json(json!({
        "success": true,
        "clientCount": client_count,
        "count": methods.len(),
        "message": format!("{} methods registered", methods.len()),
        "methods": methods,
    })))
}

/// `GET /test`: call `base64` and `addSafe` on the connected peer
pub async fn smoke_test(State(state): State<ControlState>) -> Result<Json<Value>, ControlError> {
    let client_count = state.engine.connected_count();
    if client_count == 0 {
        return Ok(Json(json!({
            "success": false,
            "clientCount": 0,
            "message": "no peer connected",
        })));
    }

    let encoded = state
        .engine
        .invoke("base64", vec![json!(SMOKE_BASE64_INPUT)])
        .await?;
    let sum = state
        .engine
        .invoke("addSafe", vec![json!(100), json!(200)])
        .await?;

    Ok(Json(json!({
        "success": true,
        "clientCount": client_count,
        "base64_input": SMOKE_BASE64_INPUT,
        "base64_output": encoded,
        "add_input": "100 + 200",
        "add_output": sum,
        "message": "RPC calls succeeded",
    })))
}

/// `GET /pending`: correlation table statistics
pub async fn pending(State(state): State<ControlState>) -> Json<StatsSnapshot> {
    Json(state.engine.table().snapshot())
}

/// `GET /health`
pub async fn health(State(state): State<ControlState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "clients": state.engine.connected_count(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::api_router;
    use crate::domain::config::CallConfig;
    use crate::domain::envelope::{EnvelopeCodec, Inbound, JsonCodec, RpcReply};
    use crate::engine::RpcEngine;
    use crate::peer::registry::ConnectionRegistry;
    use crate::peer::transport::channel::ChannelTransport;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn engine() -> Arc<RpcEngine> {
        Arc::new(RpcEngine::new(
            Arc::new(ConnectionRegistry::new()),
            CallConfig::default(),
        ))
    }

    /// Register an in-memory peer that answers like the browser agent
    fn attach_peer(engine: &Arc<RpcEngine>) {
        let (transport, mut rx) = ChannelTransport::new();
        let id = engine.registry().register(Arc::new(transport));
        let engine = Arc::clone(engine);
        tokio::spawn(async move {
            let codec = JsonCodec::new();
            while let Some(frame) = rx.recv().await {
                let Ok(Inbound::Request(request)) = codec.decode(&frame) else {
                    continue;
                };
                let (status, result) = match request.action.as_str() {
                    "getRegisteredMethods" => (200, json!("base64,addSafe,echo")),
                    "base64" => (200, json!("SGVsbG8=")),
                    "addSafe" => {
                        let sum: i64 = request.params.iter().filter_map(Value::as_i64).sum();
                        (200, json!(sum))
                    }
                    "echo" => (200, request.params.first().cloned().unwrap_or(Value::Null)),
                    _ => (404, Value::Null),
                };
                let reply = codec
                    .encode_reply(&RpcReply {
                        callback_id: request.id,
                        status,
                        result,
                    })
                    .unwrap();
                engine.route_inbound(&id, &reply);
            }
        });
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_params_to_args() {
        assert!(params_to_args(None).is_empty());
        assert!(params_to_args(Some(Value::Null)).is_empty());
        assert_eq!(params_to_args(Some(json!([1, "a"]))), vec![json!(1), json!("a")]);
        assert_eq!(params_to_args(Some(json!("solo"))), vec![json!("solo")]);
    }

    #[tokio::test]
    async fn test_clients_without_peer() {
        let (status, body) = send(api_router(engine()), get("/clients")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["clientCount"], 0);
        assert_eq!(body["connected"], false);
    }

    #[tokio::test]
    async fn test_methods_without_peer_does_not_call() {
        let engine = engine();
        let (status, body) = send(api_router(Arc::clone(&engine)), get("/methods")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["methods"], json!([]));
        assert_eq!(engine.table().snapshot().begun, 0);
    }

    #[tokio::test]
    async fn test_methods_split_from_peer() {
        let engine = engine();
        attach_peer(&engine);
        let (status, body) = send(api_router(engine), get("/methods")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["count"], 3);
        assert_eq!(body["methods"], json!(["base64", "addSafe", "echo"]));
    }

    #[tokio::test]
    async fn test_call_without_peer_is_503() {
        let (status, body) = send(
            api_router(engine()),
            post_json("/call", r#"{"action":"echo","params":["x"]}"#),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "NO_PEER_AVAILABLE");
    }

    #[tokio::test]
    async fn test_call_missing_action_is_400() {
        let router = api_router(engine());
        let (status, body) = send(router.clone(), post_json("/call", r#"{"params":[]}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_REQUEST");

        let (status, _) = send(router, post_json("/call", r#"{"action":"  "}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_call_malformed_body_is_400() {
        let (status, body) = send(api_router(engine()), post_json("/call", "{nope")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_call_round_trip_reports_status() {
        let engine = engine();
        attach_peer(&engine);
        let router = api_router(engine);

        let (status, body) = send(
            router.clone(),
            post_json("/call", r#"{"action":"echo","params":["hi"]}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["status"], 200);
        assert_eq!(body["result"], "hi");

        let (status, body) = send(router, post_json("/call", r#"{"action":"nope"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], 404);
        assert_eq!(body["result"], Value::Null);
    }

    #[tokio::test]
    async fn test_smoke_test_calls_peer() {
        let engine = engine();
        attach_peer(&engine);
        let (status, body) = send(api_router(engine), get("/test")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["base64_input"], SMOKE_BASE64_INPUT);
        assert_eq!(body["add_output"], 300);
    }

    #[tokio::test]
    async fn test_smoke_test_without_peer() {
        let (_, body) = send(api_router(engine()), get("/test")).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["clientCount"], 0);
    }

    #[tokio::test]
    async fn test_pending_reports_stats() {
        let engine = engine();
        attach_peer(&engine);
        engine.invoke("echo", vec![json!(1)]).await.unwrap();

        let (_, body) = send(api_router(engine), get("/pending")).await;
        assert_eq!(body["pending"], 0);
        assert_eq!(body["begun"], 1);
        assert_eq!(body["resolved"], 1);
    }
}
