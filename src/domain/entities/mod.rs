//! Domain entities of the message service handler

pub mod events;
pub mod message_unit;
pub mod pmode;
pub mod processing_state;
pub mod signals;
pub mod user_message;
pub mod validation;

pub use events::{EventClass, EventKind, MessageProcessingEvent};
pub use message_unit::{
    CoreId, Direction, MessageUnit, MessageUnitBody, MessageUnitClass, MessageUnitEntity,
    MessageUnitType,
};
pub use pmode::{Leg, LegLabel, MepBinding, PMode};
pub use processing_state::{ProcessingState, ProcessingStateEntry, StateHistory};
pub use signals::{EbmsError, ErrorMessage, ErrorSeverity, PullRequest, PullSelection, Receipt};
pub use user_message::{
    CollaborationInfo, Containment, Payload, PartyId, Property, Service, TradingPartner,
    UserMessage, DEFAULT_MPC,
};
pub use validation::{MessageValidationError, ValidationResult, ValidationSeverity};
