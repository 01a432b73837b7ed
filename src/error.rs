//! ==============================================================================
//! error.rs - gateway error taxonomy
//! ==============================================================================
//!
//! purpose:
//!     every operation fails with one of five kinds. the dispatcher
//!     hands these to whichever transport asked, and the transport turns
//!     the kind into a status code or an `*_error` event.
//!
//!     Validation -> 400   (caller can fix the request)
//!     NotFound   -> 404   (blob missing)
//!     Empty      -> 404   (query against an empty telemetry log)
//!     TooLarge   -> 413   (upload body over server.max_upload_bytes)
//!     Storage    -> 500   (disk failure, never retried)
//!
//! ==============================================================================

use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Empty(String),
    #[error("Upload exceeds the size limit")]
    TooLarge,
    #[error("{0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) | GatewayError::Empty(_) => StatusCode::NOT_FOUND,
            GatewayError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// body sent to clients: `{"error": "..."}`
    pub fn body(&self) -> ErrorBody {
        ErrorBody { error: self.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}
