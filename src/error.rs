//! Application Error Types
//!
//! Every failure that can reach an HTTP client maps to exactly one status
//! code and machine-readable code here. Transport and session causes are
//! kept for logs and never serialized into responses.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::session::SessionError;

/// Application error types.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid API key / webhook signature.
    #[error("{0}")]
    Unauthorized(String),

    /// Request payload failed validation.
    #[error("{0}")]
    ValidationFailed(String),

    /// Client exceeded its rate limit.
    #[error("Rate limit exceeded, retry in {retry_after} seconds")]
    TooManyRequests { retry_after: u64 },

    /// Messaging session is down and could not be restored for this request.
    #[error("Messaging session is not connected")]
    ClientNotConnected,

    /// Connecting to the messaging network failed.
    #[error("Failed to connect to messaging network")]
    ConnectionFailed(String),

    /// The session is up but the message could not be delivered.
    #[error("Failed to send message")]
    MessageSendFailed(String),

    /// Internal server error.
    #[error("Internal server error")]
    Internal(String),
}

/// Error response body for JSON responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::TooManyRequests { .. } => "TOO_MANY_REQUESTS",
            Self::ClientNotConnected => "CLIENT_NOT_CONNECTED",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::MessageSendFailed(_) => "MESSAGE_SEND_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            Self::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ClientNotConnected => StatusCode::SERVICE_UNAVAILABLE,
            Self::ConnectionFailed(_) | Self::MessageSendFailed(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        match &self {
            Self::ConnectionFailed(cause) | Self::MessageSendFailed(cause) | Self::Internal(cause) => {
                error!(code, status = status.as_u16(), cause = %cause, "request failed");
            }
            other => {
                warn!(code, status = status.as_u16(), error = %other, "request rejected");
            }
        }

        let body = Json(ErrorResponse {
            error: code.to_string(),
            message: self.to_string(),
        });

        let mut response = (status, body).into_response();
        if let Self::TooManyRequests { retry_after } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotConnected => Self::ClientNotConnected,
            SessionError::Closed => Self::ConnectionFailed("session is closed".into()),
            SessionError::ConnectionFailed(cause) => Self::ConnectionFailed(cause),
            SessionError::SendFailed(cause) => Self::MessageSendFailed(cause),
            SessionError::Transport(cause) => Self::Internal(cause),
        }
    }
}

/// Result type for request handlers.
pub type ApiResult<T> = Result<T, ApiError>;
