//! Message unit entities
//!
//! A message unit is the smallest unit of ebMS processing. All variants share
//! the identity, routing and processing-state attributes defined here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use super::processing_state::{ProcessingState, ProcessingStateEntry, StateHistory};
use super::signals::{ErrorMessage, PullRequest, Receipt};
use super::user_message::UserMessage;

/// Internal identity of a message unit
pub type CoreId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    In,
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => f.write_str("IN"),
            Direction::Out => f.write_str("OUT"),
        }
    }
}

/// Concrete type of a message unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageUnitType {
    UserMessage,
    PullRequest,
    SelectivePullRequest,
    Receipt,
    ErrorMessage,
}

impl MessageUnitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageUnitType::UserMessage => "UserMessage",
            MessageUnitType::PullRequest => "PullRequest",
            MessageUnitType::SelectivePullRequest => "SelectivePullRequest",
            MessageUnitType::Receipt => "Receipt",
            MessageUnitType::ErrorMessage => "ErrorMessage",
        }
    }

    pub fn is_signal(&self) -> bool {
        !matches!(self, MessageUnitType::UserMessage)
    }
}

impl fmt::Display for MessageUnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message unit classes used for filtering, including the abstract ones.
///
/// ```text
/// MessageUnit
/// ├── UserMessage
/// └── SignalMessage
///     ├── PullRequest
///     │   └── SelectivePullRequest
///     ├── Receipt
///     └── ErrorMessage
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageUnitClass {
    MessageUnit,
    UserMessage,
    SignalMessage,
    PullRequest,
    SelectivePullRequest,
    Receipt,
    ErrorMessage,
}

impl MessageUnitClass {
    fn parent(&self) -> Option<MessageUnitClass> {
        match self {
            MessageUnitClass::MessageUnit => None,
            MessageUnitClass::UserMessage | MessageUnitClass::SignalMessage => {
                Some(MessageUnitClass::MessageUnit)
            }
            MessageUnitClass::PullRequest
            | MessageUnitClass::Receipt
            | MessageUnitClass::ErrorMessage => Some(MessageUnitClass::SignalMessage),
            MessageUnitClass::SelectivePullRequest => Some(MessageUnitClass::PullRequest),
        }
    }

    /// Whether a unit of the given type is an instance of this class
    pub fn includes(&self, unit_type: MessageUnitType) -> bool {
        let mut class = Some(MessageUnitClass::from(unit_type));
        while let Some(c) = class {
            if c == *self {
                return true;
            }
            class = c.parent();
        }
        false
    }
}

impl From<MessageUnitType> for MessageUnitClass {
    fn from(t: MessageUnitType) -> Self {
        match t {
            MessageUnitType::UserMessage => MessageUnitClass::UserMessage,
            MessageUnitType::PullRequest => MessageUnitClass::PullRequest,
            MessageUnitType::SelectivePullRequest => MessageUnitClass::SelectivePullRequest,
            MessageUnitType::Receipt => MessageUnitClass::Receipt,
            MessageUnitType::ErrorMessage => MessageUnitClass::ErrorMessage,
        }
    }
}

/// Variant specific content of a message unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageUnitBody {
    User(UserMessage),
    PullRequest(PullRequest),
    Receipt(Receipt),
    Error(ErrorMessage),
}

/// A message unit of any type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageUnit {
    core_id: CoreId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_to_message_id: Option<String>,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmode_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub uses_multi_hop: bool,
    #[serde(default)]
    pub related_to: BTreeSet<CoreId>,
    #[serde(default)]
    states: StateHistory,
    pub body: MessageUnitBody,
}

impl MessageUnit {
    /// Create a new message unit with a fresh core id and empty history
    pub fn new(body: MessageUnitBody) -> Self {
        Self {
            core_id: Uuid::new_v4(),
            message_id: None,
            ref_to_message_id: None,
            direction: Direction::Out,
            pmode_id: None,
            timestamp: None,
            uses_multi_hop: false,
            related_to: BTreeSet::new(),
            states: StateHistory::new(),
            body,
        }
    }

    pub fn user_message(um: UserMessage) -> Self {
        Self::new(MessageUnitBody::User(um))
    }

    pub fn pull_request(pr: PullRequest) -> Self {
        Self::new(MessageUnitBody::PullRequest(pr))
    }

    pub fn receipt(receipt: Receipt, ref_to_message_id: Option<String>) -> Self {
        let mut unit = Self::new(MessageUnitBody::Receipt(receipt));
        unit.ref_to_message_id = ref_to_message_id;
        unit
    }

    pub fn error(error: ErrorMessage, ref_to_message_id: Option<String>) -> Self {
        let mut unit = Self::new(MessageUnitBody::Error(error));
        unit.ref_to_message_id = ref_to_message_id;
        unit
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_pmode_id(mut self, pmode_id: impl Into<String>) -> Self {
        self.pmode_id = Some(pmode_id.into());
        self
    }

    pub fn core_id(&self) -> CoreId {
        self.core_id
    }

    pub fn unit_type(&self) -> MessageUnitType {
        match &self.body {
            MessageUnitBody::User(_) => MessageUnitType::UserMessage,
            MessageUnitBody::PullRequest(pr) if pr.is_selective() => {
                MessageUnitType::SelectivePullRequest
            }
            MessageUnitBody::PullRequest(_) => MessageUnitType::PullRequest,
            MessageUnitBody::Receipt(_) => MessageUnitType::Receipt,
            MessageUnitBody::Error(_) => MessageUnitType::ErrorMessage,
        }
    }

    pub fn as_user_message(&self) -> Option<&UserMessage> {
        match &self.body {
            MessageUnitBody::User(um) => Some(um),
            _ => None,
        }
    }

    pub fn as_user_message_mut(&mut self) -> Option<&mut UserMessage> {
        match &mut self.body {
            MessageUnitBody::User(um) => Some(um),
            _ => None,
        }
    }

    pub fn is_user_message(&self) -> bool {
        matches!(self.body, MessageUnitBody::User(_))
    }

    pub fn states(&self) -> &StateHistory {
        &self.states
    }

    pub fn current_state(&self) -> Option<ProcessingState> {
        self.states.current_state()
    }

    /// Start time of the current state
    pub fn current_state_since(&self) -> Option<DateTime<Utc>> {
        self.states.current().map(|e| e.start_time)
    }

    /// Append a processing state; `false` when the history is already closed.
    ///
    /// Only the storage layer should call this on persisted units.
    pub(crate) fn push_state(&mut self, entry: ProcessingStateEntry) -> bool {
        self.states.push(entry)
    }

    /// Short label used in log output
    pub fn label(&self) -> String {
        format!(
            "{}[{}]",
            self.unit_type(),
            self.message_id.as_deref().unwrap_or("-")
        )
    }
}

/// Persisted message unit with its optimistic concurrency metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageUnitEntity {
    pub unit: MessageUnit,
    /// Incremented by the storage provider on every successful update
    pub version: u64,
    pub last_changed: DateTime<Utc>,
}

impl MessageUnitEntity {
    pub fn new(unit: MessageUnit, last_changed: DateTime<Utc>) -> Self {
        Self {
            unit,
            version: 0,
            last_changed,
        }
    }

    pub fn core_id(&self) -> CoreId {
        self.unit.core_id()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.unit.message_id.as_deref()
    }

    pub fn current_state(&self) -> Option<ProcessingState> {
        self.unit.current_state()
    }

    pub fn unit_type(&self) -> MessageUnitType {
        self.unit.unit_type()
    }
}
