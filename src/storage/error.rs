use thiserror::Error;

use crate::domain::entities::{CoreId, Direction};

/// Errors that can occur during storage operations
#[derive(Debug, Error, Clone)]
pub enum StorageError {
    #[error("Storage provider error: {0}")]
    Provider(String),

    /// The entity was modified since it was read (optimistic concurrency)
    #[error("Message unit {core_id} was changed concurrently")]
    AlreadyChanged { core_id: CoreId },

    #[error("Message id {message_id} already used for direction {direction}")]
    DuplicateMessageId {
        message_id: String,
        direction: Direction,
    },

    #[error("Message unit not found: {0}")]
    NotFound(CoreId),

    #[error("Payload {payload_id} cannot be linked: {reason}")]
    InvalidPayloadLink { payload_id: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl StorageError {
    /// Whether the failure is the routine outcome of two writers racing
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::AlreadyChanged { .. })
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::AlreadyChanged { .. } | StorageError::Provider(_))
    }
}

impl From<mongodb::error::Error> for StorageError {
    fn from(err: mongodb::error::Error) -> Self {
        StorageError::Provider(err.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for StorageError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<mongodb::bson::de::Error> for StorageError {
    fn from(err: mongodb::bson::de::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StorageError>;
