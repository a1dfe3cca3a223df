use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Request-terminal failures of the generation pipeline. None of these are
/// retried; a session that hits one takes its failed transition exactly once
/// and the error is surfaced to the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("API key is required")]
    MissingCredential,

    #[error("invalid API key format for {provider}")]
    InvalidCredentialFormat { provider: String },

    #[error("upstream status {status}: {message}")]
    UpstreamHttp {
        status: StatusCode,
        message: String,
        body: String,
    },

    #[error("upstream request timed out after {timeout_ms} ms")]
    UpstreamTimeout { timeout_ms: u64 },

    #[error("failed to parse upstream stream event: {detail}")]
    StreamParse { detail: String },

    #[error("upstream transport failure: {detail}")]
    Transport { detail: String },
}

impl GatewayError {
    /// Stable machine-readable code for logs and the HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::MissingCredential => "missing_credential",
            GatewayError::InvalidCredentialFormat { .. } => "invalid_credential_format",
            GatewayError::UpstreamHttp { .. } => "upstream_http_error",
            GatewayError::UpstreamTimeout { .. } => "upstream_timeout",
            GatewayError::StreamParse { .. } => "stream_parse_error",
            GatewayError::Transport { .. } => "transport_error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        let status = match &err {
            GatewayError::MissingCredential | GatewayError::InvalidCredentialFormat { .. } => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::UpstreamTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
            GatewayError::UpstreamHttp { .. }
            | GatewayError::StreamParse { .. }
            | GatewayError::Transport { .. } => StatusCode::BAD_GATEWAY,
        };
        AppError::new(status, err.code(), err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorEnvelope {
            error: ErrorBody {
                message: self.message,
                code: self.code,
            },
        };
        (self.status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
