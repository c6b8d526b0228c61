use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error as ThisError;

use super::IsRetryable;

/// The error kinds named by the core's error-handling design, plus the ambient wrapper
/// variants every request-handling path needs (IO, JSON, HTTP, actor RPC).
#[derive(Debug, ThisError)]
pub enum KiroError {
    #[error("no account available")]
    NoAccountAvailable,

    #[error("quota exceeded: {marker}")]
    QuotaExceeded { marker: String },

    #[error("content too long: {marker}")]
    ContentTooLong { marker: String },

    #[error("upstream authentication expired")]
    AuthExpired,

    #[error("refresh token rejected by upstream")]
    InvalidRefreshToken,

    #[error("upstream server error: {0}")]
    UpstreamServerError(StatusCode),

    #[error("network error: {0}")]
    Network(String),

    #[error("protocol translation error: {0}")]
    ProtocolTranslationError(String),

    #[error("client cancelled the request")]
    ClientCancelled,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("HTTP request error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("actor error: {0}")]
    ActorError(String),
}

impl IsRetryable for KiroError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            KiroError::UpstreamServerError(_) | KiroError::Network(_) | KiroError::ReqwestError(_)
        )
    }
}

impl KiroError {
    /// The `{code, message, details}` triple shown in both the JSON error body and any in-band
    /// stream error event, derived once so both always describe the same failure the same way.
    pub fn as_api_error(&self) -> ApiErrorObject {
        match self {
            KiroError::QuotaExceeded { marker } => ApiErrorObject {
                code: "QUOTA_EXCEEDED".to_string(),
                message: "Upstream quota exceeded.".to_string(),
                details: Some(Value::String(marker.clone())),
            },
            KiroError::NoAccountAvailable => ApiErrorObject {
                code: "NO_ACCOUNT_AVAILABLE".to_string(),
                message: "No available upstream account to process the request.".to_string(),
                details: None,
            },
            KiroError::ContentTooLong { marker } => ApiErrorObject {
                code: "CONTENT_TOO_LONG".to_string(),
                message: "Request content exceeds the upstream's length threshold.".to_string(),
                details: Some(Value::String(marker.clone())),
            },
            KiroError::AuthExpired | KiroError::InvalidRefreshToken => ApiErrorObject {
                code: "AUTH_EXPIRED".to_string(),
                message: "Upstream authentication failed for every available account.".to_string(),
                details: None,
            },
            KiroError::UpstreamServerError(_) | KiroError::Network(_) | KiroError::ReqwestError(_) => ApiErrorObject {
                code: "UPSTREAM_ERROR".to_string(),
                message: "Upstream service error.".to_string(),
                details: None,
            },
            KiroError::ProtocolTranslationError(detail) => ApiErrorObject {
                code: "PROTOCOL_TRANSLATION_ERROR".to_string(),
                message: "Failed to translate request or response body.".to_string(),
                details: Some(Value::String(detail.clone())),
            },
            KiroError::ClientCancelled => ApiErrorObject {
                code: "CLIENT_CANCELLED".to_string(),
                message: "Client cancelled the request.".to_string(),
                details: None,
            },
            KiroError::JsonError(_) | KiroError::IoError(_) | KiroError::ActorError(_) | KiroError::Internal(_) => ApiErrorObject {
                code: "INTERNAL_ERROR".to_string(),
                message: "An internal server error occurred.".to_string(),
                details: None,
            },
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            KiroError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            KiroError::NoAccountAvailable => StatusCode::SERVICE_UNAVAILABLE,
            KiroError::ContentTooLong { .. } => StatusCode::BAD_REQUEST,
            KiroError::AuthExpired | KiroError::InvalidRefreshToken => StatusCode::BAD_GATEWAY,
            KiroError::UpstreamServerError(_) | KiroError::Network(_) | KiroError::ReqwestError(_) => StatusCode::BAD_GATEWAY,
            KiroError::ProtocolTranslationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // The client is already gone; this status never actually reaches them.
            KiroError::ClientCancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::OK),
            KiroError::JsonError(_) | KiroError::IoError(_) | KiroError::ActorError(_) | KiroError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for KiroError {
    fn into_response(self) -> axum::response::Response {
        if matches!(self, KiroError::ClientCancelled) {
            return self.status_code().into_response();
        }
        let status = self.status_code();
        let body = self.as_api_error();
        (status, Json(ApiErrorBody { inner: body })).into_response()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorObject {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Serialize)]
pub struct ApiErrorBody {
    #[serde(rename = "error")]
    pub inner: ApiErrorObject,
}
