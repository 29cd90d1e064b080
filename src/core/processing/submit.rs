//! Submission of User Messages by the business application

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::context::MshContext;
use crate::core::pmode::{leg_for, leg_label_for};
use crate::domain::entities::{
    Containment, MessageUnit, MessageUnitEntity, ProcessingState, DEFAULT_MPC,
};
use crate::error::{MshError, Result};

pub struct MessageSubmitter {
    msh: Arc<MshContext>,
}

impl MessageSubmitter {
    pub fn new(msh: Arc<MshContext>) -> Self {
        Self { msh }
    }

    /// Accept a User Message for sending under the given P-Mode.
    ///
    /// The message is stored, validated and queued for the sender worker or,
    /// when its leg is pulled, left waiting for a Pull Request.
    pub async fn submit(&self, mut unit: MessageUnit, pmode_id: &str) -> Result<MessageUnitEntity> {
        let pmode = self
            .msh
            .pmodes
            .get(pmode_id)
            .ok_or_else(|| MshError::PModeNotFound(pmode_id.to_string()))?;
        let leg = leg_for(&unit, &pmode)
            .cloned()
            .ok_or_else(|| MshError::InvalidPMode(format!("P-Mode {} has no leg for the message", pmode.id)))?;

        let um = unit
            .as_user_message_mut()
            .ok_or_else(|| MshError::BadRequest("only User Messages can be submitted".into()))?;

        for payload in &um.payloads {
            match payload.containment {
                Containment::External => {
                    if payload.uri.as_deref().map_or(true, str::is_empty) {
                        return Err(MshError::BadRequest(format!(
                            "external payload {} has no URI",
                            payload.payload_id
                        )));
                    }
                }
                _ => {
                    let exists = match payload.content_location.as_deref() {
                        Some(location) => tokio::fs::try_exists(Path::new(location)).await?,
                        None => false,
                    };
                    if !exists {
                        return Err(MshError::BadRequest(format!(
                            "content of payload {} is not available",
                            payload.payload_id
                        )));
                    }
                }
            }
        }

        if um.mpc() == DEFAULT_MPC {
            if let Some(mpc) = leg.user_message_flow.as_ref().and_then(|f| f.mpc.as_deref()) {
                um.set_mpc(Some(mpc));
            }
        }

        unit.pmode_id = Some(pmode.id.clone());
        let mut entity = self.msh.storage.store_outgoing(unit).await?;
        self.msh.storage.set_pmode_id(&mut entity, &pmode.id).await?;

        if let Some(result) = self.msh.validation.validate(&entity.unit).await? {
            if result.should_reject {
                let description = result.describe().join("; ");
                warn!(unit = %entity.unit.label(), errors = %description, "Submitted message rejected by custom validation");
                self.msh
                    .storage
                    .set_processing_state_described(
                        &mut entity,
                        ProcessingState::Failure,
                        Some("rejected by custom validation"),
                    )
                    .await?;
                return Err(MshError::Validation(description));
            }
        }

        let label = leg_label_for(&entity.unit, &pmode);
        let pulled = pmode.binding().map_or(false, |b| b.is_pulled(label));
        let next = if pulled {
            ProcessingState::AwaitingPull
        } else {
            ProcessingState::ReadyToPush
        };
        if !self
            .msh
            .storage
            .set_processing_state_if(&mut entity, ProcessingState::Submitted, next)
            .await?
        {
            warn!(unit = %entity.unit.label(), state = ?entity.current_state(), "Submitted message changed state concurrently");
            return Err(MshError::InvalidStateTransition {
                core_id: entity.core_id(),
                from: entity.current_state().unwrap_or(ProcessingState::Submitted),
                to: next,
            });
        }
        info!(unit = %entity.unit.label(), pmode = %pmode.id, state = %next, "User Message submitted");
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::pmode::{Mep, UserMessageFlow};
    use crate::domain::entities::{
        CollaborationInfo, CoreId, Leg, PMode, Payload, ProcessingStateEntry, TradingPartner,
        UserMessage,
    };
    use crate::storage::{InMemoryStorageProvider, MessageUnitQuery, StorageProvider, StoreResult};
    use async_trait::async_trait;

    /// Fails every unit just before it would be queued for sending
    struct FailsBeforeQueueing(InMemoryStorageProvider);

    #[async_trait]
    impl StorageProvider for FailsBeforeQueueing {
        async fn store_message_unit(&self, unit: MessageUnit) -> StoreResult<MessageUnitEntity> {
            self.0.store_message_unit(unit).await
        }

        async fn update_message_unit(&self, entity: &MessageUnitEntity) -> StoreResult<MessageUnitEntity> {
            if entity.current_state() == Some(ProcessingState::ReadyToPush) {
                if let Some(mut stored) = self.0.get_message_unit(entity.core_id()).await? {
                    stored
                        .unit
                        .push_state(ProcessingStateEntry::new(ProcessingState::Failure, chrono::Utc::now()));
                    self.0.update_message_unit(&stored).await?;
                }
            }
            self.0.update_message_unit(entity).await
        }

        async fn delete_message_unit(&self, core_id: CoreId) -> StoreResult<bool> {
            self.0.delete_message_unit(core_id).await
        }

        async fn get_message_unit(&self, core_id: CoreId) -> StoreResult<Option<MessageUnitEntity>> {
            self.0.get_message_unit(core_id).await
        }

        async fn query_message_units(&self, query: &MessageUnitQuery) -> StoreResult<Vec<MessageUnitEntity>> {
            self.0.query_message_units(query).await
        }

        fn backend_name(&self) -> &'static str {
            "fails-before-queueing"
        }
    }

    fn pmode(binding: &str, mpc: Option<&str>) -> PMode {
        PMode {
            id: "pm-submit".into(),
            agreement: None,
            mep: Mep::OneWay,
            mep_binding: binding.into(),
            initiator: None,
            responder: None,
            legs: vec![Leg {
                user_message_flow: Some(UserMessageFlow {
                    mpc: mpc.map(String::from),
                    ..Default::default()
                }),
                ..Default::default()
            }],
        }
    }

    fn message() -> MessageUnit {
        MessageUnit::user_message(UserMessage::new(
            TradingPartner::default(),
            TradingPartner::default(),
            CollaborationInfo::default(),
        ))
    }

    async fn submitter(pmode: PMode) -> MessageSubmitter {
        let msh = MshContext::builder().build().unwrap();
        msh.deploy_pmode(pmode).unwrap();
        MessageSubmitter::new(msh)
    }

    #[tokio::test]
    async fn test_pushed_message_is_ready_to_push() {
        let submitter = submitter(pmode("", None)).await;
        let entity = submitter.submit(message(), "pm-submit").await.unwrap();

        assert_eq!(entity.current_state(), Some(ProcessingState::ReadyToPush));
        assert_eq!(entity.unit.pmode_id.as_deref(), Some("pm-submit"));
        assert!(entity.message_id().is_some());
    }

    #[tokio::test]
    async fn test_pulled_message_awaits_pull_on_leg_mpc() {
        let binding = "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/pull";
        let submitter = submitter(pmode(binding, Some("urn:mpc:orders"))).await;
        let entity = submitter.submit(message(), "pm-submit").await.unwrap();

        assert_eq!(entity.current_state(), Some(ProcessingState::AwaitingPull));
        assert_eq!(entity.unit.as_user_message().unwrap().mpc(), "urn:mpc:orders");
    }

    #[tokio::test]
    async fn test_reply_on_unlabelled_two_way_pmode_awaits_pull() {
        let mut two_way = pmode(
            "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/pushAndPull",
            None,
        );
        two_way.mep = Mep::TwoWay;
        two_way.legs = vec![Leg::default(), Leg::default()];
        let submitter = submitter(two_way).await;

        let request = submitter.submit(message(), "pm-submit").await.unwrap();
        assert_eq!(request.current_state(), Some(ProcessingState::ReadyToPush));

        let mut reply = message();
        reply.ref_to_message_id = Some("request-1".into());
        let reply = submitter.submit(reply, "pm-submit").await.unwrap();
        assert_eq!(reply.current_state(), Some(ProcessingState::AwaitingPull));
    }

    #[tokio::test]
    async fn test_concurrent_state_change_is_reported() {
        let msh = MshContext::builder()
            .storage_provider(Arc::new(FailsBeforeQueueing(InMemoryStorageProvider::new(true))))
            .build()
            .unwrap();
        msh.deploy_pmode(pmode("", None)).unwrap();

        let err = MessageSubmitter::new(msh.clone())
            .submit(message(), "pm-submit")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MshError::InvalidStateTransition {
                to: ProcessingState::ReadyToPush,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_pmode_is_rejected() {
        let submitter = submitter(pmode("", None)).await;
        let err = submitter.submit(message(), "missing").await.unwrap_err();
        assert!(matches!(err, MshError::PModeNotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_payload_content_is_rejected() {
        let submitter = submitter(pmode("", None)).await;
        let mut unit = message();
        unit.as_user_message_mut()
            .unwrap()
            .payloads
            .push(Payload::new(Containment::Attachment).with_content("/nonexistent/file.xml", "text/xml"));

        let err = submitter.submit(unit, "pm-submit").await.unwrap_err();
        assert!(matches!(err, MshError::BadRequest(_)));
    }
}
