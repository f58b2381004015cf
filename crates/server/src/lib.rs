//! Avatar Gateway Server
//!
//! Binds the turn pipeline, SSE dispatcher, and video range server to an
//! HTTP/2-capable endpoint layer.

pub mod http;
pub mod metrics;
pub mod sse;
pub mod state;
pub mod turns;
pub mod videos;

pub use http::create_router;
pub use metrics::init_metrics;
pub use sse::SseDispatcher;
pub use state::AppState;
pub use turns::TurnRegistry;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use avatar_gateway_core::GatewayError;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("not found")]
    NotFound,

    #[error("not ready")]
    NotReady,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<&ServerError> for StatusCode {
    fn from(err: &ServerError) -> Self {
        match err {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GatewayError> for ServerError {
    fn from(err: GatewayError) -> Self {
        match &err {
            GatewayError::InvalidInput(msg) => Self::InvalidRequest(msg.clone()),
            _ => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
