//! Processing of submitted and received message units

pub mod context;
pub mod inbound;
pub mod submit;

pub use context::ProcessingContext;
pub use inbound::InboundProcessor;
pub use submit::MessageSubmitter;

use tracing::{debug, warn};

use crate::core::context::MshContext;
use crate::core::pmode::leg_for;
use crate::domain::entities::{
    EventKind, MessageProcessingEvent, MessageUnitEntity, PMode, ProcessingState,
};
use crate::error::Result;

/// Record the outcome of handing a message unit in `SENDING` to the transport.
///
/// User Messages that expect a Receipt go to `AWAITING_RECEIPT` whether or not
/// the transfer worked, so the retransmission worker decides about a retry.
/// Other User Messages end in `DELIVERED` or `FAILURE`, signals in `DONE` or
/// `FAILURE`.
pub async fn finish_transmission(
    msh: &MshContext,
    entity: &mut MessageUnitEntity,
    pmode: Option<&PMode>,
    failure: Option<String>,
) -> Result<()> {
    let expects_receipt = entity.unit.is_user_message()
        && pmode
            .and_then(|p| leg_for(&entity.unit, p))
            .map_or(false, |leg| leg.reception_awareness.is_some());

    msh.events
        .raise_event(MessageProcessingEvent::new(
            &entity.unit,
            EventKind::MessageTransfer {
                success: failure.is_none(),
                failure_reason: failure.clone(),
            },
        ))
        .await;

    let next = match &failure {
        None if expects_receipt => ProcessingState::AwaitingReceipt,
        None if entity.unit.is_user_message() => ProcessingState::Delivered,
        None => ProcessingState::Done,
        Some(reason) => {
            warn!(unit = %entity.unit.label(), reason = %reason, "Transfer failed");
            msh.storage
                .set_processing_state_described(
                    entity,
                    ProcessingState::TransportFailure,
                    Some(reason.as_str()),
                )
                .await?;
            if expects_receipt {
                ProcessingState::AwaitingReceipt
            } else {
                ProcessingState::Failure
            }
        }
    };

    msh.storage.set_processing_state(entity, next).await?;
    debug!(unit = %entity.unit.label(), state = %next, "Transmission finished");
    Ok(())
}
