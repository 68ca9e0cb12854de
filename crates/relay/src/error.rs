use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("envelope rejected: {0}")]
    EnvelopeRejected(&'static str),
    #[error("scope gate denied")]
    ScopeGateDenied,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found")]
    NotFound,
    #[error("egress error: {0}")]
    Egress(#[from] bridge_egress::EgressError),
    #[error("store error: {0}")]
    Store(#[from] bridge_store::StoreError),
    #[error("memory error: {0}")]
    Memory(#[from] bridge_memory::MemoryError),
    #[error("attachment error: {0}")]
    Attachment(#[from] bridge_attachments::AttachmentError),
    #[error("provider error: {0}")]
    Provider(#[from] bridge_providers::ProviderError),
    #[error("audit log error: {0}")]
    Audit(#[from] bridge_audit_log::AuditLogError),
}

impl RelayError {
    fn status(&self) -> StatusCode {
        match self {
            RelayError::EnvelopeRejected(_) => StatusCode::UNAUTHORIZED,
            RelayError::ScopeGateDenied => StatusCode::FORBIDDEN,
            RelayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::NotFound => StatusCode::NOT_FOUND,
            RelayError::Egress(e) => match e {
                bridge_egress::EgressError::MetadataBlocked(_)
                | bridge_egress::EgressError::PrivateIpBlocked(_)
                | bridge_egress::EgressError::PortDenied(_)
                | bridge_egress::EgressError::SchemeDenied => StatusCode::BAD_GATEWAY,
                _ => StatusCode::BAD_GATEWAY,
            },
            RelayError::Store(_) | RelayError::Audit(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Memory(_) | RelayError::Attachment(_) | RelayError::Provider(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn code(&self) -> String {
        match self {
            RelayError::Egress(e) => e.code().to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.code() }));
        (status, body).into_response()
    }
}
