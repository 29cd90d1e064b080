use chrono::{DateTime, Utc};

use crate::domain::entities::{Direction, MessageUnitEntity, MessageUnitType, ProcessingState};

/// Filter for message unit queries. Unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageUnitQuery {
    pub unit_types: Option<Vec<MessageUnitType>>,
    pub direction: Option<Direction>,
    /// Matches against the current state only
    pub states: Option<Vec<ProcessingState>>,
    pub pmode_ids: Option<Vec<String>>,
    pub message_id: Option<String>,
    /// Current state started strictly before this instant
    pub state_changed_before: Option<DateTime<Utc>>,
}

impl MessageUnitQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_states(mut self, states: &[ProcessingState]) -> Self {
        self.states = Some(states.to_vec());
        self
    }

    pub fn of_types(mut self, types: &[MessageUnitType]) -> Self {
        self.unit_types = Some(types.to_vec());
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn pmode_ids(mut self, ids: &[String]) -> Self {
        self.pmode_ids = Some(ids.to_vec());
        self
    }

    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn state_changed_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.state_changed_before = Some(cutoff);
        self
    }

    /// Evaluate the filter against an entity, used by providers that query in memory
    pub fn matches(&self, entity: &MessageUnitEntity) -> bool {
        let unit = &entity.unit;
        if let Some(types) = &self.unit_types {
            if !types.contains(&unit.unit_type()) {
                return false;
            }
        }
        if let Some(direction) = self.direction {
            if unit.direction != direction {
                return false;
            }
        }
        if let Some(states) = &self.states {
            match unit.current_state() {
                Some(s) if states.contains(&s) => {}
                _ => return false,
            }
        }
        if let Some(ids) = &self.pmode_ids {
            match &unit.pmode_id {
                Some(id) if ids.contains(id) => {}
                _ => return false,
            }
        }
        if let Some(message_id) = &self.message_id {
            if unit.message_id.as_ref() != Some(message_id) {
                return false;
            }
        }
        if let Some(cutoff) = self.state_changed_before {
            match unit.current_state_since() {
                Some(since) if since < cutoff => {}
                _ => return false,
            }
        }
        true
    }
}
