//! Message processing events
//!
//! Events are raised while message units are processed and routed to the
//! handlers configured in the P-Mode or globally. Event classes form a small
//! hierarchy so a handler can subscribe to a whole family at once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::message_unit::MessageUnit;
use super::signals::EbmsError;
use super::validation::ValidationResult;

/// Event classes; `parent()` defines the hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventClass {
    /// Root of the hierarchy, matches every event
    MessageProcessing,
    MessageTransfer,
    MessageDelivery,
    ReceiptCreated,
    SignalReceived,
    ReceiptReceived,
    ErrorReceived,
    SecurityProcessing,
    SignatureCreated,
    EncryptionCreated,
    SignatureVerified,
    SecurityFailure,
    ValidationFailed,
    HeaderValidationFailed,
    CustomValidationFailed,
    DuplicateReceived,
    RetriesExhausted,
    MessageUnitPurged,
}

impl EventClass {
    pub fn parent(&self) -> Option<EventClass> {
        use EventClass::*;
        match self {
            MessageProcessing => None,
            ReceiptReceived | ErrorReceived => Some(SignalReceived),
            SignatureCreated | EncryptionCreated | SignatureVerified | SecurityFailure => {
                Some(SecurityProcessing)
            }
            HeaderValidationFailed | CustomValidationFailed => Some(ValidationFailed),
            _ => Some(MessageProcessing),
        }
    }

    /// Whether `self` equals `other` or is one of its descendants
    pub fn is_a(&self, other: EventClass) -> bool {
        let mut class = Some(*self);
        while let Some(c) = class {
            if c == other {
                return true;
            }
            class = c.parent();
        }
        false
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Event specific data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    MessageTransfer {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failure_reason: Option<String>,
    },
    MessageDelivery {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failure_reason: Option<String>,
    },
    ReceiptCreated {
        receipt_message_id: String,
        for_duplicate: bool,
    },
    ReceiptReceived {
        receipt_message_id: String,
    },
    ErrorReceived {
        errors: Vec<EbmsError>,
    },
    SignatureCreated {
        algorithm: String,
        certificate: String,
    },
    EncryptionCreated {
        algorithm: String,
        certificate: String,
    },
    SignatureVerified {
        algorithm: String,
        certificate: String,
    },
    SecurityFailure {
        reason: String,
    },
    HeaderValidationFailed {
        errors: Vec<String>,
    },
    CustomValidationFailed {
        result: ValidationResult,
    },
    DuplicateReceived,
    RetriesExhausted {
        transmissions: usize,
    },
    MessageUnitPurged,
}

impl EventKind {
    pub fn class(&self) -> EventClass {
        match self {
            EventKind::MessageTransfer { .. } => EventClass::MessageTransfer,
            EventKind::MessageDelivery { .. } => EventClass::MessageDelivery,
            EventKind::ReceiptCreated { .. } => EventClass::ReceiptCreated,
            EventKind::ReceiptReceived { .. } => EventClass::ReceiptReceived,
            EventKind::ErrorReceived { .. } => EventClass::ErrorReceived,
            EventKind::SignatureCreated { .. } => EventClass::SignatureCreated,
            EventKind::EncryptionCreated { .. } => EventClass::EncryptionCreated,
            EventKind::SignatureVerified { .. } => EventClass::SignatureVerified,
            EventKind::SecurityFailure { .. } => EventClass::SecurityFailure,
            EventKind::HeaderValidationFailed { .. } => EventClass::HeaderValidationFailed,
            EventKind::CustomValidationFailed { .. } => EventClass::CustomValidationFailed,
            EventKind::DuplicateReceived => EventClass::DuplicateReceived,
            EventKind::RetriesExhausted { .. } => EventClass::RetriesExhausted,
            EventKind::MessageUnitPurged => EventClass::MessageUnitPurged,
        }
    }
}

/// An event about the processing of one message unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageProcessingEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// The message unit the event is about; events without one are dropped
    pub subject: Option<MessageUnit>,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MessageProcessingEvent {
    pub fn new(subject: &MessageUnit, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            subject: Some(subject.clone()),
            kind,
            message: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn without_subject(kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            subject: None,
            kind,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn class(&self) -> EventClass {
        self.kind.class()
    }
}
