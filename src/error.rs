use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::entities::{CoreId, ProcessingState};
use crate::storage::StorageError;

#[derive(thiserror::Error, Debug)]
pub enum MshError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Message unit {core_id} cannot move from {from} to {to}")]
    InvalidStateTransition {
        core_id: CoreId,
        from: ProcessingState,
        to: ProcessingState,
    },

    #[error("P-Mode not found: {0}")]
    PModeNotFound(String),

    #[error("Invalid P-Mode: {0}")]
    InvalidPMode(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Message validation error: {0}")]
    Validation(String),

    #[error("Message delivery error: {0}")]
    Delivery(#[from] MessageDeliveryError),

    #[error("Security processing error: {0}")]
    Security(#[from] SecurityProcessingError),

    #[error("Event handling error: {0}")]
    EventHandling(#[from] EventHandlingError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Packaging error: {0}")]
    Packaging(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure reported by a message deliverer
#[derive(thiserror::Error, Debug, Clone)]
#[error("{message}")]
pub struct MessageDeliveryError {
    pub message: String,
    /// Whether retrying the delivery may succeed
    pub permanent: bool,
}

impl MessageDeliveryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            permanent: false,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            permanent: true,
        }
    }
}

/// What part of the security processing failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityFailureReason {
    MissingConfiguration,
    Signing,
    Encryption,
    SignatureVerification,
    Decryption,
    Other,
}

/// Failure reported by the security provider
#[derive(thiserror::Error, Debug, Clone)]
#[error("{reason:?}: {message}")]
pub struct SecurityProcessingError {
    pub reason: SecurityFailureReason,
    pub message: String,
}

impl SecurityProcessingError {
    pub fn new(reason: SecurityFailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Failure raised by an event handler
#[derive(thiserror::Error, Debug, Clone)]
#[error("{0}")]
pub struct EventHandlingError(pub String);

// Add From implementations for common error types
impl From<std::io::Error> for MshError {
    fn from(err: std::io::Error) -> Self {
        MshError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for MshError {
    fn from(err: serde_json::Error) -> Self {
        MshError::Packaging(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for MshError {
    fn from(err: serde_yaml::Error) -> Self {
        MshError::Configuration(format!("YAML error: {}", err))
    }
}

impl From<reqwest::Error> for MshError {
    fn from(err: reqwest::Error) -> Self {
        MshError::Transport(err.to_string())
    }
}

impl IntoResponse for MshError {
    fn into_response(self) -> Response {
        let status = match &self {
            MshError::NotFound(_) | MshError::PModeNotFound(_) => StatusCode::NOT_FOUND,
            MshError::BadRequest(_) | MshError::Packaging(_) => StatusCode::BAD_REQUEST,
            MshError::Validation(_) | MshError::InvalidPMode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MshError::Storage(StorageError::DuplicateMessageId { .. }) => StatusCode::CONFLICT,
            MshError::Transport(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, MshError>;
