//! AS4 reception awareness
//!
//! User Messages waiting for a Receipt longer than the retry interval are
//! sent again, until the number of transmissions reaches the configured
//! maximum. After that the message has failed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::Worker;
use crate::core::context::MshContext;
use crate::core::pmode::{leg_for, leg_label_for};
use crate::domain::entities::{
    Direction, EventKind, MessageProcessingEvent, MessageUnitEntity, MessageUnitType,
    ProcessingState,
};
use crate::error::Result;

pub struct RetransmissionWorker {
    msh: Arc<MshContext>,
}

impl RetransmissionWorker {
    pub fn new(msh: Arc<MshContext>) -> Self {
        Self { msh }
    }

    async fn check(&self, mut entity: MessageUnitEntity, now: DateTime<Utc>) -> Result<()> {
        let Some(pmode) = entity
            .unit
            .pmode_id
            .as_deref()
            .and_then(|id| self.msh.pmodes.get(id))
        else {
            warn!(unit = %entity.unit.label(), "P-Mode of message awaiting Receipt is not available");
            return Ok(());
        };
        let Some(reception_awareness) = leg_for(&entity.unit, &pmode).and_then(|l| l.reception_awareness.clone())
        else {
            debug!(unit = %entity.unit.label(), pmode = %pmode.id, "No reception awareness configured");
            return Ok(());
        };

        let waiting_since = entity.unit.current_state_since().unwrap_or(now);
        let interval = i64::try_from(reception_awareness.retry_interval.as_millis())
            .ok()
            .and_then(chrono::Duration::try_milliseconds)
            .unwrap_or(chrono::Duration::MAX);
        if now - waiting_since < interval {
            return Ok(());
        }

        let storage = &self.msh.storage;
        let transmissions = self.msh.query.number_of_transmissions(&entity);
        if transmissions >= reception_awareness.max_retries as usize {
            if storage
                .set_processing_state_if(&mut entity, ProcessingState::AwaitingReceipt, ProcessingState::Failure)
                .await?
            {
                warn!(unit = %entity.unit.label(), transmissions, "No Receipt received, retries exhausted");
                self.msh
                    .events
                    .raise_event(MessageProcessingEvent::new(
                        &entity.unit,
                        EventKind::RetriesExhausted { transmissions },
                    ))
                    .await;
            }
            return Ok(());
        }

        let pulled = pmode
            .binding()
            .map_or(false, |b| b.is_pulled(leg_label_for(&entity.unit, &pmode)));
        let next = if pulled {
            ProcessingState::AwaitingPull
        } else {
            ProcessingState::ReadyToPush
        };
        if storage
            .set_processing_state_if(&mut entity, ProcessingState::AwaitingReceipt, next)
            .await?
        {
            info!(unit = %entity.unit.label(), transmissions, state = %next, "Resending message without Receipt");
        }
        Ok(())
    }
}

#[async_trait]
impl Worker for RetransmissionWorker {
    fn name(&self) -> &str {
        "retransmission"
    }

    async fn run(&self) -> Result<()> {
        let now = self.msh.clock.now();
        let waiting = self
            .msh
            .query
            .get_message_units_in_state(
                &[MessageUnitType::UserMessage],
                Some(Direction::Out),
                &[],
                &[ProcessingState::AwaitingReceipt],
            )
            .await?;

        for entity in waiting {
            let label = entity.unit.label();
            if let Err(e) = self.check(entity, now).await {
                error!(unit = %label, error = %e, "Cannot check message awaiting Receipt");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::domain::entities::pmode::{Interval, Mep, ReceptionAwarenessConfig, TimeUnit};
    use crate::domain::entities::{
        CollaborationInfo, Leg, MessageUnit, PMode, TradingPartner, UserMessage,
    };

    fn pmode(max_retries: u32, binding: &str) -> PMode {
        PMode {
            id: "pm-ra".into(),
            agreement: None,
            mep: Mep::OneWay,
            mep_binding: binding.into(),
            initiator: None,
            responder: None,
            legs: vec![Leg {
                reception_awareness: Some(ReceptionAwarenessConfig {
                    max_retries,
                    retry_interval: Interval::new(5, TimeUnit::Seconds),
                    use_duplicate_detection: true,
                }),
                ..Default::default()
            }],
        }
    }

    async fn setup(pmode: PMode) -> (Arc<MshContext>, Arc<ManualClock>, MessageUnitEntity) {
        let clock = Arc::new(ManualClock::default());
        let msh = MshContext::builder().clock(clock.clone()).build().unwrap();
        msh.deploy_pmode(pmode).unwrap();

        let unit = MessageUnit::user_message(UserMessage::new(
            TradingPartner::default(),
            TradingPartner::default(),
            CollaborationInfo::default(),
        ))
        .with_pmode_id("pm-ra");
        let mut entity = msh.storage.store_outgoing(unit).await.unwrap();
        for state in [ProcessingState::Sending, ProcessingState::AwaitingReceipt] {
            msh.storage.set_processing_state(&mut entity, state).await.unwrap();
        }
        (msh, clock, entity)
    }

    async fn current(msh: &MshContext, entity: &MessageUnitEntity) -> ProcessingState {
        msh.query
            .get_by_core_id(entity.core_id())
            .await
            .unwrap()
            .unwrap()
            .current_state()
            .unwrap()
    }

    #[tokio::test]
    async fn test_waits_for_interval_before_resending() {
        let (msh, clock, entity) = setup(pmode(2, "")).await;
        let worker = RetransmissionWorker::new(msh.clone());

        clock.advance(chrono::Duration::seconds(4));
        worker.run().await.unwrap();
        assert_eq!(current(&msh, &entity).await, ProcessingState::AwaitingReceipt);

        clock.advance(chrono::Duration::seconds(1));
        worker.run().await.unwrap();
        assert_eq!(current(&msh, &entity).await, ProcessingState::ReadyToPush);
    }

    #[tokio::test]
    async fn test_huge_interval_never_expires() {
        let mut pmode = pmode(2, "");
        if let Some(ra) = pmode.legs[0].reception_awareness.as_mut() {
            ra.retry_interval = Interval::new(u64::MAX, TimeUnit::Hours);
        }
        let (msh, clock, entity) = setup(pmode).await;
        let worker = RetransmissionWorker::new(msh.clone());

        clock.advance(chrono::Duration::days(3650));
        worker.run().await.unwrap();
        assert_eq!(current(&msh, &entity).await, ProcessingState::AwaitingReceipt);
    }

    #[tokio::test]
    async fn test_pulled_message_waits_for_next_pull() {
        let binding = "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/pull";
        let (msh, clock, entity) = setup(pmode(2, binding)).await;
        let worker = RetransmissionWorker::new(msh.clone());

        clock.advance(chrono::Duration::seconds(5));
        worker.run().await.unwrap();
        assert_eq!(current(&msh, &entity).await, ProcessingState::AwaitingPull);
    }

    #[tokio::test]
    async fn test_zero_retries_fails_after_first_interval() {
        let (msh, clock, entity) = setup(pmode(0, "")).await;
        let worker = RetransmissionWorker::new(msh.clone());

        worker.run().await.unwrap();
        assert_eq!(current(&msh, &entity).await, ProcessingState::AwaitingReceipt);

        clock.advance(chrono::Duration::seconds(5));
        worker.run().await.unwrap();
        assert_eq!(current(&msh, &entity).await, ProcessingState::Failure);
    }
}
