use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("envelope rejected: {0}")]
    EnvelopeRejected(&'static str),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("payload too large")]
    PayloadTooLarge,
}

impl AgentError {
    fn status(&self) -> StatusCode {
        match self {
            AgentError::EnvelopeRejected(_) => StatusCode::UNAUTHORIZED,
            AgentError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AgentError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    fn code(&self) -> String {
        match self {
            AgentError::EnvelopeRejected(reason) => reason.to_string(),
            AgentError::BadRequest(msg) => msg.clone(),
            AgentError::PayloadTooLarge => "payload-too-large".to_string(),
        }
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.code() }))).into_response()
    }
}
