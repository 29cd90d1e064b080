//! Read-only access to message unit metadata
//!
//! All reads are snapshots. Callers that act on the result must claim the unit
//! with a conditional state transition first.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::entities::{
    CoreId, Direction, MessageUnitEntity, MessageUnitType, ProcessingState, PullSelection,
};
use crate::error::Result;
use crate::storage::{MessageUnitQuery, StorageProvider};

#[derive(Clone)]
pub struct QueryManager {
    provider: Arc<dyn StorageProvider>,
}

impl QueryManager {
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self { provider }
    }

    /// Message units whose current state is one of `states`, oldest first.
    /// Empty filter slices are ignored.
    pub async fn get_message_units_in_state(
        &self,
        types: &[MessageUnitType],
        direction: Option<Direction>,
        pmode_ids: &[String],
        states: &[ProcessingState],
    ) -> Result<Vec<MessageUnitEntity>> {
        let mut query = MessageUnitQuery::new();
        if !states.is_empty() {
            query = query.in_states(states);
        }
        if !types.is_empty() {
            query = query.of_types(types);
        }
        if let Some(direction) = direction {
            query = query.direction(direction);
        }
        if !pmode_ids.is_empty() {
            query = query.pmode_ids(pmode_ids);
        }
        Ok(self.provider.query_message_units(&query).await?)
    }

    pub async fn get_message_units_with_id(
        &self,
        message_id: &str,
        direction: Option<Direction>,
    ) -> Result<Vec<MessageUnitEntity>> {
        let mut query = MessageUnitQuery::new().message_id(message_id);
        if let Some(direction) = direction {
            query = query.direction(direction);
        }
        Ok(self.provider.query_message_units(&query).await?)
    }

    /// Units whose current state started before `cutoff`
    pub async fn get_message_units_with_last_state_change_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MessageUnitEntity>> {
        let query = MessageUnitQuery::new().state_changed_before(cutoff);
        Ok(self.provider.query_message_units(&query).await?)
    }

    pub async fn get_by_core_id(&self, core_id: CoreId) -> Result<Option<MessageUnitEntity>> {
        Ok(self.provider.get_message_unit(core_id).await?)
    }

    /// Number of times the unit was handed to the transport, failed attempts
    /// included
    pub fn number_of_transmissions(&self, entity: &MessageUnitEntity) -> usize {
        entity.unit.states().count(ProcessingState::Sending)
    }

    /// Whether a received message unit with this id already reached `DELIVERED`
    /// or `FAILURE`
    pub async fn is_already_processed(&self, message_id: &str) -> Result<bool> {
        let received = self
            .get_message_units_with_id(message_id, Some(Direction::In))
            .await?;
        Ok(received.iter().any(|e| {
            matches!(
                e.current_state(),
                Some(ProcessingState::Delivered) | Some(ProcessingState::Failure)
            )
        }))
    }

    /// Outgoing User Messages waiting to be pulled from `mpc`, oldest first,
    /// optionally narrowed by a selective pull criteria
    pub async fn get_for_pulling(
        &self,
        mpc: &str,
        selection: Option<&PullSelection>,
        pmode_ids: &[String],
    ) -> Result<Vec<MessageUnitEntity>> {
        let waiting = self
            .get_message_units_in_state(
                &[MessageUnitType::UserMessage],
                Some(Direction::Out),
                pmode_ids,
                &[ProcessingState::AwaitingPull],
            )
            .await?;

        Ok(waiting
            .into_iter()
            .filter(|e| {
                let Some(um) = e.unit.as_user_message() else {
                    return false;
                };
                if um.mpc() != mpc {
                    return false;
                }
                let Some(selection) = selection else {
                    return true;
                };
                let info = &um.collaboration_info;
                let matches = |criterion: &Option<String>, value: Option<&str>| {
                    criterion.as_deref().map_or(true, |c| Some(c) == value)
                };
                matches(&selection.ref_to_message_id, e.unit.ref_to_message_id.as_deref())
                    && matches(&selection.conversation_id, Some(info.conversation_id.as_str()))
                    && matches(
                        &selection.agreement_reference,
                        info.agreement_reference.as_ref().map(|a| a.name.as_str()),
                    )
                    && matches(&selection.service, Some(info.service.name.as_str()))
                    && matches(&selection.action, Some(info.action.as_str()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::{Clock, ManualClock};
    use crate::core::persistence::StorageManager;
    use crate::domain::entities::{
        CollaborationInfo, MessageUnit, Receipt, TradingPartner, UserMessage,
    };
    use crate::storage::InMemoryStorageProvider;

    fn setup() -> (StorageManager, QueryManager, Arc<ManualClock>) {
        let provider: Arc<dyn StorageProvider> = Arc::new(InMemoryStorageProvider::default());
        let clock = Arc::new(ManualClock::default());
        (
            StorageManager::new(provider.clone(), clock.clone()),
            QueryManager::new(provider),
            clock,
        )
    }

    fn user_message(mpc: Option<&str>, conversation: &str) -> MessageUnit {
        let info = CollaborationInfo {
            conversation_id: conversation.to_string(),
            ..Default::default()
        };
        MessageUnit::user_message(
            UserMessage::new(TradingPartner::default(), TradingPartner::default(), info).with_mpc(mpc),
        )
    }

    #[tokio::test]
    async fn test_state_query_filters() {
        let (storage, query, _) = setup();
        let mut um = storage.store_outgoing(user_message(None, "c-1")).await.unwrap();
        storage.set_pmode_id(&mut um, "pm-1").await.unwrap();
        storage
            .store_outgoing(MessageUnit::receipt(Receipt::default(), Some("x".into())))
            .await
            .unwrap();

        let submitted = query
            .get_message_units_in_state(&[], Some(Direction::Out), &[], &[ProcessingState::Submitted])
            .await
            .unwrap();
        assert_eq!(submitted.len(), 1);

        let by_pmode = query
            .get_message_units_in_state(
                &[MessageUnitType::UserMessage],
                None,
                &["pm-2".to_string()],
                &[ProcessingState::Submitted],
            )
            .await
            .unwrap();
        assert!(by_pmode.is_empty());

        let created = query
            .get_message_units_in_state(&[MessageUnitType::Receipt], None, &[], &[ProcessingState::Created])
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
    }

    #[tokio::test]
    async fn test_already_processed_only_for_received_units() {
        let (storage, query, _) = setup();
        let mut inbound = storage
            .store_incoming(user_message(None, "c-1").with_message_id("m-1"))
            .await
            .unwrap();
        assert!(!query.is_already_processed("m-1").await.unwrap());

        storage
            .set_processing_state(&mut inbound, ProcessingState::Delivered)
            .await
            .unwrap();
        assert!(query.is_already_processed("m-1").await.unwrap());

        let mut outbound = storage
            .store_outgoing(user_message(None, "c-1").with_message_id("m-2"))
            .await
            .unwrap();
        storage
            .set_processing_state(&mut outbound, ProcessingState::Failure)
            .await
            .unwrap();
        assert!(!query.is_already_processed("m-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_transmission_count_and_cutoff() {
        let (storage, query, clock) = setup();
        let mut entity = storage.store_outgoing(user_message(None, "c-1")).await.unwrap();
        for state in [
            ProcessingState::ReadyToPush,
            ProcessingState::Processing,
            ProcessingState::Sending,
            ProcessingState::TransportFailure,
            ProcessingState::ReadyToPush,
            ProcessingState::Sending,
        ] {
            storage.set_processing_state(&mut entity, state).await.unwrap();
        }
        assert_eq!(query.number_of_transmissions(&entity), 2);

        let cutoff = clock.now();
        assert!(query
            .get_message_units_with_last_state_change_before(cutoff)
            .await
            .unwrap()
            .is_empty());

        clock.advance(chrono::Duration::seconds(1));
        let stale = query
            .get_message_units_with_last_state_change_before(clock.now())
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
    }

    #[tokio::test]
    async fn test_pulling_respects_mpc_and_selection() {
        let (storage, query, _) = setup();
        for (mpc, conversation) in [(None, "c-1"), (Some("urn:mpc:other"), "c-1"), (None, "c-2")] {
            let mut e = storage
                .store_outgoing(user_message(mpc, conversation))
                .await
                .unwrap();
            storage
                .set_processing_state(&mut e, ProcessingState::AwaitingPull)
                .await
                .unwrap();
        }

        let default_mpc = crate::domain::entities::DEFAULT_MPC;
        assert_eq!(query.get_for_pulling(default_mpc, None, &[]).await.unwrap().len(), 2);

        let selection = PullSelection {
            conversation_id: Some("c-2".into()),
            ..Default::default()
        };
        let selected = query
            .get_for_pulling(default_mpc, Some(&selection), &[])
            .await
            .unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(
            selected[0].unit.as_user_message().unwrap().collaboration_info.conversation_id,
            "c-2"
        );
    }
}
