//! Error responses for the control plane.

use crate::domain::error::{codes, BridgeError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Failure returned by a control-plane handler.
#[derive(Debug)]
pub struct ControlError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ControlError {
    /// Malformed or incomplete request body
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: codes::INVALID_REQUEST,
            message: message.into(),
        }
    }
}

impl From<BridgeError> for ControlError {
    fn from(err: BridgeError) -> Self {
        Self {
            status: StatusCode::from_u16(err.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "success": false,
                "error": self.code,
                "message": self.message,
            })),
        )
            .into_response()
    }
}
