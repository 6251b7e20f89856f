//! Wire envelopes and the JSON codec.
//!
//! Request: `{"id": "...", "action": "...", "params": [...]}`
//! Reply:   `{"callbackId": "...", "status": 200, "result": ...}`
//!
//! Decoding classifies by field presence: `callbackId` marks a reply,
//! `action` marks a request. Unknown fields are ignored.

use crate::domain::error::CodecError;
use crate::domain::ids::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Call sent to a peer (or, rarely, initiated by one)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: RequestId,
    pub action: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl RpcRequest {
    pub fn new(id: RequestId, action: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id,
            action: action.into(),
            params,
        }
    }
}

/// Peer's answer to an `RpcRequest`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReply {
    /// Equal to the originating request's id
    pub callback_id: RequestId,
    /// 200 success, 404 unknown method, 500 execution error
    #[serde(default)]
    pub status: i32,
    #[serde(default)]
    pub result: Value,
}

/// Classification of a decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Reply(RpcReply),
    Request(RpcRequest),
    /// Valid JSON carrying neither envelope shape (keepalives and the like)
    Unrecognized,
}

/// Encodes outbound requests and classifies inbound frames.
pub trait EnvelopeCodec: Send + Sync {
    fn encode(&self, request: &RpcRequest) -> Result<String, CodecError>;
    fn decode(&self, frame: &str) -> Result<Inbound, CodecError>;
}

/// JSON envelope codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }

    /// Encode a reply (peer side of the protocol)
    pub fn encode_reply(&self, reply: &RpcReply) -> Result<String, CodecError> {
        serde_json::to_string(reply).map_err(|e| CodecError::Encode(e.to_string()))
    }
}

impl EnvelopeCodec for JsonCodec {
    fn encode(&self, request: &RpcRequest) -> Result<String, CodecError> {
        serde_json::to_string(request).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, frame: &str) -> Result<Inbound, CodecError> {
        let value: Value = serde_json::from_str(frame)?;

        let Value::Object(ref fields) = value else {
            return Ok(Inbound::Unrecognized);
        };

        let has = |key: &str| fields.get(key).is_some_and(|v| !v.is_null());

        if has("callbackId") {
            let reply: RpcReply = serde_json::from_value(value)?;
            Ok(Inbound::Reply(reply))
        } else if has("action") {
            let request: RpcRequest = serde_json::from_value(value)?;
            Ok(Inbound::Request(request))
        } else {
            Ok(Inbound::Unrecognized)
        }
    }
}
