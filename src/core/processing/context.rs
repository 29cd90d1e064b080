//! State of one exchange being processed
//!
//! Tracks the message units touched while processing a received message and
//! the units to return to the sender. When processing fails unexpectedly all
//! tracked units that did not reach a final state are set to `FAILURE`.

use tracing::{error, warn};

use crate::core::context::MshContext;
use crate::domain::entities::{CoreId, MessageUnitEntity, ProcessingState};

pub struct ProcessingContext {
    in_flight: Vec<CoreId>,
    responses: Vec<MessageUnitEntity>,
    response_channel: bool,
}

impl ProcessingContext {
    /// `response_channel` tells whether the sender is waiting for a synchronous
    /// response. Without one, responses go out as callbacks.
    pub fn new(response_channel: bool) -> Self {
        Self {
            in_flight: Vec::new(),
            responses: Vec::new(),
            response_channel,
        }
    }

    pub fn has_response_channel(&self) -> bool {
        self.response_channel
    }

    pub fn track(&mut self, entity: &MessageUnitEntity) {
        if !self.in_flight.contains(&entity.core_id()) {
            self.in_flight.push(entity.core_id());
        }
    }

    pub fn in_flight(&self) -> &[CoreId] {
        &self.in_flight
    }

    /// Queue a unit for the synchronous response
    pub fn add_response(&mut self, entity: MessageUnitEntity) {
        self.track(&entity);
        self.responses.push(entity);
    }

    pub fn responses(&self) -> &[MessageUnitEntity] {
        &self.responses
    }

    pub fn take_responses(&mut self) -> Vec<MessageUnitEntity> {
        std::mem::take(&mut self.responses)
    }

    /// Set every tracked unit that is not in a final state to `FAILURE` and
    /// forget about them
    pub async fn interrupt(&mut self, msh: &MshContext, reason: &str) {
        for core_id in std::mem::take(&mut self.in_flight) {
            let mut entity = match msh.query.get_by_core_id(core_id).await {
                Ok(Some(entity)) => entity,
                Ok(None) => continue,
                Err(e) => {
                    error!(core_id = %core_id, error = %e, "Cannot load interrupted message unit");
                    continue;
                }
            };
            if entity.unit.states().is_closed() {
                continue;
            }
            warn!(unit = %entity.unit.label(), reason = %reason, "Processing interrupted");
            if let Err(e) = msh
                .storage
                .set_processing_state_described(&mut entity, ProcessingState::Failure, Some(reason))
                .await
            {
                error!(unit = %entity.unit.label(), error = %e, "Cannot mark interrupted message unit as failed");
            }
        }
        self.responses.clear();
    }
}
