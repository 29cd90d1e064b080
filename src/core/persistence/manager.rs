//! Storage manager
//!
//! Single entry point for every change to message unit metadata. All workers
//! and handlers share the conditional state transition implemented here,
//! which is what keeps two workers from processing the same message unit.

use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::clock::Clock;
use crate::domain::entities::{
    CoreId, Direction, MessageUnit, MessageUnitBody, MessageUnitEntity, Payload, ProcessingState,
    ProcessingStateEntry,
};
use crate::error::{MshError, Result};
use crate::storage::{StorageError, StorageProvider};

/// Attempts for an unconditional update that keeps losing the version race
const MAX_UPDATE_ATTEMPTS: usize = 5;

pub const DEFAULT_MESSAGE_ID_DOMAIN: &str = "as4-msh.local";

pub struct StorageManager {
    provider: Arc<dyn StorageProvider>,
    clock: Arc<dyn Clock>,
    message_id_domain: String,
}

impl StorageManager {
    pub fn new(provider: Arc<dyn StorageProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            provider,
            clock,
            message_id_domain: DEFAULT_MESSAGE_ID_DOMAIN.to_string(),
        }
    }

    /// Domain part used for generated message ids
    pub fn with_message_id_domain(mut self, domain: impl Into<String>) -> Self {
        self.message_id_domain = domain.into();
        self
    }

    pub fn provider(&self) -> &Arc<dyn StorageProvider> {
        &self.provider
    }

    /// Generate a globally unique message id of the form `<uuid>@<domain>`
    pub fn generate_message_id(&self) -> String {
        format!("{}@{}", Uuid::new_v4(), self.message_id_domain)
    }

    /// Store a message unit received from a counterparty, in state `RECEIVED`
    pub async fn store_incoming(&self, mut unit: MessageUnit) -> Result<MessageUnitEntity> {
        unit.direction = Direction::In;
        link_payloads(&mut unit)?;
        unit.push_state(ProcessingStateEntry::new(
            ProcessingState::Received,
            self.clock.now(),
        ));

        let entity = self.provider.store_message_unit(unit).await?;
        debug!(unit = %entity.unit.label(), core_id = %entity.core_id(), "Stored incoming message unit");
        Ok(entity)
    }

    /// Store a message unit to be sent.
    ///
    /// User Messages and Pull Requests start in `SUBMITTED`, signals created by
    /// the MSH in `CREATED`. Missing message ids and timestamps are filled in.
    pub async fn store_outgoing(&self, mut unit: MessageUnit) -> Result<MessageUnitEntity> {
        unit.direction = Direction::Out;
        if unit.message_id.as_deref().map_or(true, str::is_empty) {
            unit.message_id = Some(self.generate_message_id());
        }
        let now = self.clock.now();
        if unit.timestamp.is_none() {
            unit.timestamp = Some(now);
        }
        link_payloads(&mut unit)?;

        let initial = match unit.body {
            MessageUnitBody::User(_) | MessageUnitBody::PullRequest(_) => ProcessingState::Submitted,
            MessageUnitBody::Receipt(_) | MessageUnitBody::Error(_) => ProcessingState::Created,
        };
        unit.push_state(ProcessingStateEntry::new(initial, now));

        let entity = self.provider.store_message_unit(unit).await?;
        debug!(unit = %entity.unit.label(), core_id = %entity.core_id(), "Stored outgoing message unit");
        Ok(entity)
    }

    /// Unconditionally move the unit to a new state.
    ///
    /// Fails with `InvalidStateTransition` when the unit is in a final state.
    pub async fn set_processing_state(
        &self,
        entity: &mut MessageUnitEntity,
        state: ProcessingState,
    ) -> Result<()> {
        self.set_processing_state_described(entity, state, None).await
    }

    pub async fn set_processing_state_described(
        &self,
        entity: &mut MessageUnitEntity,
        state: ProcessingState,
        description: Option<&str>,
    ) -> Result<()> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let mut candidate = entity.clone();
            let mut entry = ProcessingStateEntry::new(state, self.clock.now());
            if let Some(d) = description {
                entry = entry.with_description(d);
            }
            if !candidate.unit.push_state(entry) {
                return Err(MshError::InvalidStateTransition {
                    core_id: entity.core_id(),
                    from: entity.current_state().unwrap_or(state),
                    to: state,
                });
            }

            match self.provider.update_message_unit(&candidate).await {
                Ok(updated) => {
                    debug!(unit = %updated.unit.label(), state = %state, "Processing state changed");
                    *entity = updated;
                    return Ok(());
                }
                Err(StorageError::AlreadyChanged { .. }) => {
                    self.reload(entity).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StorageError::AlreadyChanged {
            core_id: entity.core_id(),
        }
        .into())
    }

    /// Move the unit to `new_state` only if its current state is still
    /// `expected`.
    ///
    /// The check and the write are one versioned update at the storage
    /// provider, so of several concurrent callers exactly one gets `true`.
    /// Losing the race is not an error: `false` is returned and `entity` is
    /// refreshed with the stored data when possible.
    pub async fn set_processing_state_if(
        &self,
        entity: &mut MessageUnitEntity,
        expected: ProcessingState,
        new_state: ProcessingState,
    ) -> Result<bool> {
        if entity.current_state() != Some(expected) {
            return Ok(false);
        }

        let mut candidate = entity.clone();
        if !candidate
            .unit
            .push_state(ProcessingStateEntry::new(new_state, self.clock.now()))
        {
            return Ok(false);
        }

        match self.provider.update_message_unit(&candidate).await {
            Ok(updated) => {
                debug!(
                    unit = %updated.unit.label(),
                    from = %expected,
                    to = %new_state,
                    "Processing state changed"
                );
                *entity = updated;
                Ok(true)
            }
            Err(StorageError::AlreadyChanged { .. }) => {
                debug!(unit = %entity.unit.label(), expected = %expected, "Lost state transition race");
                if let Err(e) = self.reload(entity).await {
                    warn!(unit = %entity.unit.label(), error = %e, "Could not reload message unit");
                }
                Ok(false)
            }
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn set_pmode_id(&self, entity: &mut MessageUnitEntity, pmode_id: &str) -> Result<()> {
        let pmode_id = pmode_id.to_string();
        self.modify(entity, |unit| {
            unit.pmode_id = Some(pmode_id.clone());
            Ok(())
        })
        .await
    }

    pub async fn set_multi_hop(&self, entity: &mut MessageUnitEntity, uses_multi_hop: bool) -> Result<()> {
        self.modify(entity, |unit| {
            unit.uses_multi_hop = uses_multi_hop;
            Ok(())
        })
        .await
    }

    /// Replace the payload meta-data of a User Message
    pub async fn set_payload_information(
        &self,
        entity: &mut MessageUnitEntity,
        payloads: Vec<Payload>,
    ) -> Result<()> {
        self.modify(entity, |unit| {
            let core_id = unit.core_id();
            let um = unit.as_user_message_mut().ok_or_else(|| {
                MshError::BadRequest("payloads can only be set on a User Message".to_string())
            })?;
            let mut linked = payloads.clone();
            for payload in linked.iter_mut() {
                link_payload(payload, core_id)?;
            }
            um.payloads = linked;
            Ok(())
        })
        .await
    }

    /// Record that the unit is related to another message unit
    pub async fn add_related(&self, entity: &mut MessageUnitEntity, related: CoreId) -> Result<()> {
        self.modify(entity, |unit| {
            unit.related_to.insert(related);
            Ok(())
        })
        .await
    }

    /// Remove the unit's metadata; `false` when it was already gone
    pub async fn delete_message_unit(&self, entity: &MessageUnitEntity) -> Result<bool> {
        let deleted = self.provider.delete_message_unit(entity.core_id()).await?;
        if deleted {
            debug!(unit = %entity.unit.label(), "Deleted message unit");
        }
        Ok(deleted)
    }

    async fn reload(&self, entity: &mut MessageUnitEntity) -> Result<()> {
        match self.provider.get_message_unit(entity.core_id()).await? {
            Some(fresh) => {
                *entity = fresh;
                Ok(())
            }
            None => Err(StorageError::NotFound(entity.core_id()).into()),
        }
    }

    /// Apply an attribute change, re-applying it on a fresh copy after a
    /// version conflict
    async fn modify<F>(&self, entity: &mut MessageUnitEntity, mut change: F) -> Result<()>
    where
        F: FnMut(&mut MessageUnit) -> Result<()> + Send,
    {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let mut candidate = entity.clone();
            change(&mut candidate.unit)?;
            match self.provider.update_message_unit(&candidate).await {
                Ok(updated) => {
                    *entity = updated;
                    return Ok(());
                }
                Err(StorageError::AlreadyChanged { .. }) => self.reload(entity).await?,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StorageError::AlreadyChanged {
            core_id: entity.core_id(),
        }
        .into())
    }
}

fn link_payloads(unit: &mut MessageUnit) -> Result<()> {
    let core_id = unit.core_id();
    if let Some(um) = unit.as_user_message_mut() {
        for payload in um.payloads.iter_mut() {
            link_payload(payload, core_id)?;
        }
    }
    Ok(())
}

fn link_payload(payload: &mut Payload, core_id: CoreId) -> Result<()> {
    match payload.parent_core_id {
        Some(parent) if parent != core_id => Err(StorageError::InvalidPayloadLink {
            payload_id: payload.payload_id.to_string(),
            reason: format!("already linked to message unit {}", parent),
        }
        .into()),
        _ => {
            payload.parent_core_id = Some(core_id);
            Ok(())
        }
    }
}
