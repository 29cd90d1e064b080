//! Pushes message units that are `READY_TO_PUSH`

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::Worker;
use crate::core::context::MshContext;
use crate::core::transport::TransportDispatcher;
use crate::domain::entities::{Direction, MessageUnitEntity, ProcessingState};
use crate::error::Result;

pub struct SenderWorker {
    msh: Arc<MshContext>,
    dispatcher: Arc<TransportDispatcher>,
}

impl SenderWorker {
    pub fn new(msh: Arc<MshContext>, dispatcher: Arc<TransportDispatcher>) -> Self {
        Self { msh, dispatcher }
    }

    async fn send(&self, mut entity: MessageUnitEntity) -> Result<()> {
        let storage = &self.msh.storage;
        let pmode = entity
            .unit
            .pmode_id
            .as_deref()
            .and_then(|id| self.msh.pmodes.get(id));
        let Some(pmode) = pmode else {
            warn!(unit = %entity.unit.label(), pmode = ?entity.unit.pmode_id, "Cannot send message unit without P-Mode");
            return storage
                .set_processing_state_described(&mut entity, ProcessingState::Failure, Some("no P-Mode"))
                .await;
        };

        if !storage
            .set_processing_state_if(&mut entity, ProcessingState::ReadyToPush, ProcessingState::Processing)
            .await?
        {
            debug!(unit = %entity.unit.label(), "Message unit already claimed by another sender");
            return Ok(());
        }

        if let Err(e) = self.dispatcher.dispatch(entity.clone(), pmode).await {
            error!(unit = %entity.unit.label(), error = %e, "Sending message unit failed");
            storage
                .set_processing_state_if(&mut entity, ProcessingState::Processing, ProcessingState::Failure)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Worker for SenderWorker {
    fn name(&self) -> &str {
        "sender"
    }

    async fn run(&self) -> Result<()> {
        let ready = self
            .msh
            .query
            .get_message_units_in_state(&[], Some(Direction::Out), &[], &[ProcessingState::ReadyToPush])
            .await?;
        if !ready.is_empty() {
            debug!(count = ready.len(), "Message units ready to push");
        }

        for entity in ready {
            let label = entity.unit.label();
            if let Err(e) = self.send(entity).await {
                error!(unit = %label, error = %e, "Cannot process message unit ready to push");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::TransportService;
    use crate::domain::entities::pmode::Mep;
    use crate::domain::entities::{
        CollaborationInfo, Leg, MessageUnit, PMode, TradingPartner, UserMessage,
    };
    use crate::error::MshError;
    use std::sync::Mutex;

    struct StubTransport {
        fail: bool,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TransportService for StubTransport {
        fn name(&self) -> &str {
            "as4"
        }

        async fn send(&self, entity: MessageUnitEntity, _pmode: Arc<PMode>) -> Result<()> {
            if self.fail {
                return Err(MshError::Transport("endpoint unreachable".into()));
            }
            self.sent.lock().unwrap().push(entity.unit.label());
            Ok(())
        }
    }

    fn pmode() -> PMode {
        PMode {
            id: "pm-send".into(),
            agreement: None,
            mep: Mep::OneWay,
            mep_binding: String::new(),
            initiator: None,
            responder: None,
            legs: vec![Leg::default()],
        }
    }

    async fn ready_message(msh: &MshContext, pmode_id: Option<&str>) -> MessageUnitEntity {
        let mut unit = MessageUnit::user_message(UserMessage::new(
            TradingPartner::default(),
            TradingPartner::default(),
            CollaborationInfo::default(),
        ));
        unit.pmode_id = pmode_id.map(String::from);
        let mut entity = msh.storage.store_outgoing(unit).await.unwrap();
        msh.storage
            .set_processing_state(&mut entity, ProcessingState::ReadyToPush)
            .await
            .unwrap();
        entity
    }

    fn setup(fail: bool) -> (Arc<MshContext>, Arc<StubTransport>, SenderWorker) {
        let msh = MshContext::builder().build().unwrap();
        msh.deploy_pmode(pmode()).unwrap();
        let transport = Arc::new(StubTransport {
            fail,
            sent: Mutex::new(Vec::new()),
        });
        let dispatcher = Arc::new(TransportDispatcher::new());
        dispatcher.register(transport.clone());
        let worker = SenderWorker::new(msh.clone(), dispatcher);
        (msh, transport, worker)
    }

    #[tokio::test]
    async fn test_ready_message_is_dispatched_once() {
        let (msh, transport, worker) = setup(false);
        let entity = ready_message(&msh, Some("pm-send")).await;

        worker.run().await.unwrap();
        worker.run().await.unwrap();

        assert_eq!(transport.sent.lock().unwrap().len(), 1);
        let stored = msh.query.get_by_core_id(entity.core_id()).await.unwrap().unwrap();
        assert_eq!(stored.current_state(), Some(ProcessingState::Processing));
    }

    #[tokio::test]
    async fn test_message_without_pmode_fails() {
        let (msh, transport, worker) = setup(false);
        let entity = ready_message(&msh, None).await;

        worker.run().await.unwrap();

        assert!(transport.sent.lock().unwrap().is_empty());
        let stored = msh.query.get_by_core_id(entity.core_id()).await.unwrap().unwrap();
        assert_eq!(stored.current_state(), Some(ProcessingState::Failure));
    }

    #[tokio::test]
    async fn test_dispatch_error_fails_message() {
        let (msh, _transport, worker) = setup(true);
        let entity = ready_message(&msh, Some("pm-send")).await;

        worker.run().await.unwrap();

        let stored = msh.query.get_by_core_id(entity.core_id()).await.unwrap().unwrap();
        assert_eq!(stored.current_state(), Some(ProcessingState::Failure));
    }
}
