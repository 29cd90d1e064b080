//! Removes old message units
//!
//! Units whose last state change lies more than `purgeAfterDays` days in the
//! past are deleted together with the payload content of User Messages. Units
//! that are still in a non-final state are left alone and reported.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{parameter, Worker};
use crate::core::context::MshContext;
use crate::domain::entities::{EventKind, MessageProcessingEvent, MessageUnitEntity};
use crate::error::Result;

pub const PURGE_AFTER_DAYS: &str = "purgeAfterDays";
pub const DEFAULT_PURGE_AFTER_DAYS: i64 = 30;
pub const MAX_PURGE_AFTER_DAYS: i64 = 36_500;

pub struct PurgeWorker {
    msh: Arc<MshContext>,
    purge_after_days: i64,
}

impl PurgeWorker {
    pub fn new(msh: Arc<MshContext>, purge_after_days: i64) -> Self {
        let purge_after_days = if (1..=MAX_PURGE_AFTER_DAYS).contains(&purge_after_days) {
            purge_after_days
        } else {
            warn!(
                parameter = PURGE_AFTER_DAYS,
                value = purge_after_days,
                default = DEFAULT_PURGE_AFTER_DAYS,
                "Retention period out of range, using default"
            );
            DEFAULT_PURGE_AFTER_DAYS
        };
        Self {
            msh,
            purge_after_days,
        }
    }

    pub fn from_parameters(msh: Arc<MshContext>, parameters: &HashMap<String, String>) -> Self {
        Self::new(
            msh,
            parameter(parameters, PURGE_AFTER_DAYS, DEFAULT_PURGE_AFTER_DAYS),
        )
    }

    /// `false` when the unit was already removed
    async fn purge(&self, entity: &MessageUnitEntity) -> Result<bool> {
        if !self.msh.storage.delete_message_unit(entity).await? {
            return Ok(false);
        }

        if let Some(um) = entity.unit.as_user_message() {
            for location in um.payloads.iter().filter_map(|p| p.content_location.as_deref()) {
                match tokio::fs::remove_file(location).await {
                    Ok(()) => debug!(location, "Removed payload content"),
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => warn!(location, error = %e, "Cannot remove payload content"),
                }
            }
            self.msh
                .events
                .raise_event(MessageProcessingEvent::new(&entity.unit, EventKind::MessageUnitPurged))
                .await;
        }
        Ok(true)
    }
}

#[async_trait]
impl Worker for PurgeWorker {
    fn name(&self) -> &str {
        "purge"
    }

    async fn run(&self) -> Result<()> {
        let Some(cutoff) = chrono::Duration::try_days(self.purge_after_days)
            .and_then(|retention| self.msh.clock.now().checked_sub_signed(retention))
        else {
            warn!(days = self.purge_after_days, "Cannot compute purge cutoff");
            return Ok(());
        };
        let stale = self
            .msh
            .query
            .get_message_units_with_last_state_change_before(cutoff)
            .await?;

        let mut purged = 0;
        for entity in stale {
            if !entity.unit.states().is_closed() {
                warn!(
                    unit = %entity.unit.label(),
                    state = ?entity.current_state(),
                    "Message unit has not changed state since before the purge cutoff"
                );
                continue;
            }
            match self.purge(&entity).await {
                Ok(true) => purged += 1,
                Ok(false) => debug!(unit = %entity.unit.label(), "Message unit already purged"),
                Err(e) => error!(unit = %entity.unit.label(), error = %e, "Cannot purge message unit"),
            }
        }
        if purged > 0 {
            info!(purged, %cutoff, "Purged old message units");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::events::{HandlerFactoryRegistry, MessageProcessingEventHandler};
    use crate::domain::entities::pmode::EventHandlerConfig;
    use crate::domain::entities::{
        CollaborationInfo, Containment, MessageUnit, Payload, ProcessingState, Receipt,
        TradingPartner, UserMessage,
    };
    use crate::error::EventHandlingError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl MessageProcessingEventHandler for Recorder {
        async fn handle_event(&self, event: &MessageProcessingEvent) -> std::result::Result<(), EventHandlingError> {
            self.0.lock().unwrap().push(event.class().to_string());
            Ok(())
        }

        fn handler_name(&self) -> &str {
            "recorder"
        }
    }

    #[tokio::test]
    async fn test_purges_final_units_once() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("payload.bin");
        tokio::fs::write(&content, b"data").await.unwrap();

        let recorder = Arc::new(Recorder::default());
        let mut handlers = HandlerFactoryRegistry::new();
        let shared = recorder.clone();
        handlers.register(
            "recorder",
            Arc::new(
                move |_: &HashMap<String, String>| -> Result<Arc<dyn MessageProcessingEventHandler>> {
                    Ok(shared.clone())
                },
            ),
        );

        let clock = Arc::new(ManualClock::default());
        let msh = MshContext::builder()
            .clock(clock.clone())
            .handler_factories(handlers)
            .global_handlers(vec![EventHandlerConfig::new("recorder")])
            .build()
            .unwrap();

        let um = UserMessage::new(TradingPartner::default(), TradingPartner::default(), CollaborationInfo::default())
            .with_payload(Payload::new(Containment::Attachment).with_content(content.to_string_lossy(), "application/octet-stream"));
        let mut delivered = msh.storage.store_incoming(MessageUnit::user_message(um)).await.unwrap();
        msh.storage.set_processing_state(&mut delivered, ProcessingState::Delivered).await.unwrap();

        let mut receipt = msh
            .storage
            .store_outgoing(MessageUnit::receipt(Receipt::default(), Some("m-1".into())))
            .await
            .unwrap();
        msh.storage.set_processing_state(&mut receipt, ProcessingState::Done).await.unwrap();

        let waiting = msh
            .storage
            .store_incoming(MessageUnit::user_message(UserMessage::new(
                TradingPartner::default(),
                TradingPartner::default(),
                CollaborationInfo::default(),
            )))
            .await
            .unwrap();

        let worker = PurgeWorker::new(msh.clone(), 30);
        clock.advance(chrono::Duration::days(29));
        worker.run().await.unwrap();
        assert!(msh.query.get_by_core_id(delivered.core_id()).await.unwrap().is_some());

        clock.advance(chrono::Duration::days(2));
        worker.run().await.unwrap();
        worker.run().await.unwrap();

        assert!(msh.query.get_by_core_id(delivered.core_id()).await.unwrap().is_none());
        assert!(msh.query.get_by_core_id(receipt.core_id()).await.unwrap().is_none());
        assert!(msh.query.get_by_core_id(waiting.core_id()).await.unwrap().is_some());
        assert!(!content.exists());

        // one event for the User Message, none for the Receipt, none for the second run
        assert_eq!(*recorder.0.lock().unwrap(), vec!["MessageUnitPurged".to_string()]);
    }

    #[test]
    fn test_invalid_retention_uses_default() {
        let msh = MshContext::builder().build().unwrap();
        let mut parameters = HashMap::new();
        parameters.insert(PURGE_AFTER_DAYS.to_string(), "soon".to_string());
        assert_eq!(
            PurgeWorker::from_parameters(msh, &parameters).purge_after_days,
            DEFAULT_PURGE_AFTER_DAYS
        );
    }

    #[tokio::test]
    async fn test_out_of_range_retention_keeps_fresh_units() {
        let clock = Arc::new(ManualClock::default());
        let msh = MshContext::builder().clock(clock.clone()).build().unwrap();
        let mut delivered = msh
            .storage
            .store_incoming(MessageUnit::user_message(UserMessage::new(
                TradingPartner::default(),
                TradingPartner::default(),
                CollaborationInfo::default(),
            )))
            .await
            .unwrap();
        msh.storage.set_processing_state(&mut delivered, ProcessingState::Delivered).await.unwrap();

        for days in ["-1", "0", "100000000"] {
            let mut parameters = HashMap::new();
            parameters.insert(PURGE_AFTER_DAYS.to_string(), days.to_string());
            let worker = PurgeWorker::from_parameters(msh.clone(), &parameters);
            assert_eq!(worker.purge_after_days, DEFAULT_PURGE_AFTER_DAYS);

            worker.run().await.unwrap();
            assert!(msh.query.get_by_core_id(delivered.core_id()).await.unwrap().is_some());
        }

        clock.advance(chrono::Duration::days(31));
        PurgeWorker::new(msh.clone(), i64::MAX).run().await.unwrap();
        assert!(msh.query.get_by_core_id(delivered.core_id()).await.unwrap().is_none());
    }
}
