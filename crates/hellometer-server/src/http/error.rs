//! Error responses for the HTTP layer.
//!
//! Telemetry never produces these; the only source is a recovered panic.

use std::any::Any;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("internal error: {0}")]
    Internal(String),
}

impl HttpError {
    pub fn client_code(&self) -> &'static str {
        match self {
            HttpError::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match self {
            HttpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // panic payloads stay in the log, not in the body
        let body = Json(json!({
            "error": self.client_code(),
            "message": "internal server error",
        }));
        (status, body).into_response()
    }
}

/// `CatchPanicLayer` hook: log the payload, answer 500.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!(panic = %detail, "request handler panicked");
    HttpError::Internal(detail).into_response()
}
