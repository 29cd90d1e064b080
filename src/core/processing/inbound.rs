//! Processing of received message units
//!
//! Every received unit is stored in `RECEIVED` first. What happens next
//! depends on its type:
//!
//! * User Message: P-Mode lookup, security verification, decompression,
//!   duplicate elimination, custom validation, delivery and Receipt creation
//! * Receipt: the acknowledged User Message becomes `DELIVERED`
//! * Error: the referenced message unit gets `FAILURE` or `WARNING`
//! * Pull Request: the oldest waiting User Message on the MPC is returned
//!
//! Signals created in reaction are returned in the synchronous response or,
//! when configured as callbacks or when there is no response channel, queued
//! for the sender worker.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{finish_transmission, ProcessingContext};
use crate::core::compression::{decompress_payloads, is_compressed};
use crate::core::context::MshContext;
use crate::core::pmode::{find_for_user_message, leg_for};
use crate::core::providers::SecurityOperation;
use crate::core::validation::validate_header;
use crate::domain::entities::pmode::{ReplyPattern, SecurityConfig};
use crate::domain::entities::{
    Direction, EbmsError, ErrorMessage, ErrorSeverity, EventKind, Leg, MessageProcessingEvent,
    MessageUnit, MessageUnitBody, MessageUnitEntity, MessageUnitType, ProcessingState, Receipt,
    DEFAULT_MPC,
};
use crate::error::{MshError, Result, SecurityFailureReason, SecurityProcessingError};

pub struct InboundProcessor {
    msh: Arc<MshContext>,
}

impl InboundProcessor {
    pub fn new(msh: Arc<MshContext>) -> Self {
        Self { msh }
    }

    /// Process the units of a received request. Returns the units to send back
    /// in the response, already stored.
    pub async fn process_request(&self, units: Vec<MessageUnit>) -> Vec<MessageUnitEntity> {
        let mut pctx = ProcessingContext::new(true);
        self.process_all(&mut pctx, units).await;
        pctx.take_responses()
    }

    /// Process the units received in the response to a message this MSH sent
    pub async fn process_response(&self, units: Vec<MessageUnit>) {
        let mut pctx = ProcessingContext::new(false);
        self.process_all(&mut pctx, units).await;
    }

    /// Record whether the response carrying `responses` reached the sender
    pub async fn mark_responses_sent(&self, responses: Vec<MessageUnitEntity>, failure: Option<String>) {
        for mut entity in responses {
            let pmode = entity
                .unit
                .pmode_id
                .as_deref()
                .and_then(|id| self.msh.pmodes.get(id));
            let result = async {
                self.msh
                    .storage
                    .set_processing_state(&mut entity, ProcessingState::Sending)
                    .await?;
                finish_transmission(&self.msh, &mut entity, pmode.as_deref(), failure.clone()).await
            }
            .await;
            if let Err(e) = result {
                error!(unit = %entity.unit.label(), error = %e, "Cannot record response transmission");
            }
        }
    }

    async fn process_all(&self, pctx: &mut ProcessingContext, units: Vec<MessageUnit>) {
        for unit in units {
            let message_id = unit.message_id.clone();
            let label = unit.label();
            if let Err(e) = self.process_unit(pctx, unit).await {
                error!(unit = %label, error = %e, "Unexpected failure while processing received message");
                pctx.interrupt(&self.msh, &e.to_string()).await;
                self.reply_generic_error(pctx, message_id.as_deref()).await;
                break;
            }
        }
    }

    async fn process_unit(&self, pctx: &mut ProcessingContext, unit: MessageUnit) -> Result<()> {
        let header_errors = validate_header(&unit);
        let mut entity = self.msh.storage.store_incoming(unit).await?;
        pctx.track(&entity);
        debug!(unit = %entity.unit.label(), "Received message unit");

        if !header_errors.is_empty() {
            warn!(unit = %entity.unit.label(), errors = ?header_errors, "Invalid message header");
            self.msh
                .events
                .raise_event(MessageProcessingEvent::new(
                    &entity.unit,
                    EventKind::HeaderValidationFailed {
                        errors: header_errors.clone(),
                    },
                ))
                .await;
            self.fail(&mut entity, "invalid header").await?;
            let error = EbmsError::invalid_header().with_description(header_errors.join("; "));
            return self.reply_error(pctx, error, &entity, None).await;
        }

        match entity.unit_type() {
            MessageUnitType::UserMessage => self.process_user_message(pctx, entity).await,
            MessageUnitType::PullRequest | MessageUnitType::SelectivePullRequest => {
                self.process_pull_request(pctx, entity).await
            }
            MessageUnitType::Receipt => self.process_receipt(entity).await,
            MessageUnitType::ErrorMessage => self.process_error(entity).await,
        }
    }

    async fn process_user_message(
        &self,
        pctx: &mut ProcessingContext,
        mut entity: MessageUnitEntity,
    ) -> Result<()> {
        let um = entity
            .unit
            .as_user_message()
            .cloned()
            .ok_or_else(|| MshError::Internal("expected a User Message".into()))?;

        let Some(pmode) = find_for_user_message(&self.msh.pmodes, &um) else {
            warn!(unit = %entity.unit.label(), "No P-Mode found for received User Message");
            self.fail(&mut entity, "no matching P-Mode").await?;
            let error = EbmsError::value_inconsistent().with_description("No P-Mode matches the message");
            return self.reply_error(pctx, error, &entity, None).await;
        };
        self.msh.storage.set_pmode_id(&mut entity, &pmode.id).await?;
        let leg = leg_for(&entity.unit, &pmode)
            .cloned()
            .ok_or_else(|| MshError::InvalidPMode(format!("P-Mode {} has no matching leg", pmode.id)))?;

        if let Some(security) = leg.security.as_ref().filter(|s| !s.is_empty()) {
            if let Err(e) = self.verify_security(&entity, security).await {
                self.fail(&mut entity, &e.message).await?;
                let error = match e.reason {
                    SecurityFailureReason::Decryption => EbmsError::failed_decryption(),
                    _ => EbmsError::failed_authentication(),
                };
                return self.reply_error(pctx, error, &entity, Some(&leg)).await;
            }
        }

        if um.payloads.iter().any(is_compressed) {
            let mut restored = um.clone();
            if let Err(e) = decompress_payloads(&mut restored).await {
                warn!(unit = %entity.unit.label(), error = %e, "Cannot decompress payloads");
                self.fail(&mut entity, "decompression failed").await?;
                let error = EbmsError::decompression_failure().with_description(e.to_string());
                return self.reply_error(pctx, error, &entity, Some(&leg)).await;
            }
            self.msh
                .storage
                .set_payload_information(&mut entity, restored.payloads)
                .await?;
        }

        let message_id = entity.message_id().unwrap_or_default().to_string();
        if leg.uses_duplicate_detection() && self.msh.query.is_already_processed(&message_id).await? {
            info!(unit = %entity.unit.label(), "Duplicate User Message received");
            self.msh
                .storage
                .set_processing_state(&mut entity, ProcessingState::Duplicate)
                .await?;
            self.msh
                .events
                .raise_event(MessageProcessingEvent::new(&entity.unit, EventKind::DuplicateReceived))
                .await;
            if leg.receipt.is_some() {
                self.create_receipt(pctx, &entity, &leg, true).await?;
            }
            return Ok(());
        }

        if let Some(result) = self.msh.validation.validate(&entity.unit).await? {
            if result.should_reject {
                let description = result.describe().join("; ");
                warn!(unit = %entity.unit.label(), errors = %description, "User Message rejected by custom validation");
                self.fail(&mut entity, "rejected by custom validation").await?;
                let error = EbmsError::other().with_description(description);
                return self.reply_error(pctx, error, &entity, Some(&leg)).await;
            }
        }

        if !self.deliver(pctx, &mut entity, &leg).await? {
            return Ok(());
        }

        if leg.receipt.is_some() {
            self.create_receipt(pctx, &entity, &leg, false).await?;
        }
        Ok(())
    }

    /// Deliver the User Message; `false` when it was not delivered
    async fn deliver(
        &self,
        pctx: &mut ProcessingContext,
        entity: &mut MessageUnitEntity,
        leg: &Leg,
    ) -> Result<bool> {
        let storage = &self.msh.storage;
        storage
            .set_processing_state(entity, ProcessingState::ReadyForDelivery)
            .await?;

        let Some(spec) = &leg.delivery else {
            warn!(unit = %entity.unit.label(), "No delivery configured for User Message");
            storage
                .set_processing_state_described(
                    entity,
                    ProcessingState::DeliveryFailed,
                    Some("no delivery configured"),
                )
                .await?;
            let error = EbmsError::delivery_failure().with_description("Message cannot be delivered");
            self.reply_error(pctx, error, entity, Some(leg)).await?;
            return Ok(false);
        };
        let deliverer = self.msh.delivery.deliverer_for(spec)?;

        if !storage
            .set_processing_state_if(
                entity,
                ProcessingState::ReadyForDelivery,
                ProcessingState::OutForDelivery,
            )
            .await?
        {
            debug!(unit = %entity.unit.label(), "User Message is already being delivered");
            return Ok(false);
        }

        match deliverer.deliver(&entity.unit).await {
            Ok(()) => {
                storage
                    .set_processing_state(entity, ProcessingState::Delivered)
                    .await?;
                self.msh
                    .events
                    .raise_event(MessageProcessingEvent::new(
                        &entity.unit,
                        EventKind::MessageDelivery {
                            success: true,
                            failure_reason: None,
                        },
                    ))
                    .await;
                Ok(true)
            }
            Err(e) => {
                warn!(unit = %entity.unit.label(), error = %e, permanent = e.permanent, "Delivery failed");
                storage
                    .set_processing_state_described(
                        entity,
                        ProcessingState::DeliveryFailed,
                        Some(e.message.as_str()),
                    )
                    .await?;
                self.msh
                    .events
                    .raise_event(MessageProcessingEvent::new(
                        &entity.unit,
                        EventKind::MessageDelivery {
                            success: false,
                            failure_reason: Some(e.message.clone()),
                        },
                    ))
                    .await;
                let error = EbmsError::delivery_failure().with_description(e.message);
                self.reply_error(pctx, error, entity, Some(leg)).await?;
                Ok(false)
            }
        }
    }

    async fn process_receipt(&self, mut entity: MessageUnitEntity) -> Result<()> {
        let ref_id = entity.unit.ref_to_message_id.clone().unwrap_or_default();
        let sent = self
            .msh
            .query
            .get_message_units_with_id(&ref_id, Some(Direction::Out))
            .await?;
        let known = !sent.is_empty();

        let mut acknowledged = None;
        for mut candidate in sent.into_iter().filter(|e| e.unit.is_user_message()) {
            let Some(current) = candidate.current_state().filter(|s| {
                matches!(
                    s,
                    ProcessingState::Sending
                        | ProcessingState::AwaitingReceipt
                        | ProcessingState::TransportFailure
                        | ProcessingState::ReadyToPush
                        | ProcessingState::AwaitingPull
                )
            }) else {
                continue;
            };
            if self
                .msh
                .storage
                .set_processing_state_if(&mut candidate, current, ProcessingState::Delivered)
                .await?
            {
                acknowledged = Some(candidate);
                break;
            }
        }

        let Some(user_message) = acknowledged else {
            if known {
                debug!(unit = %entity.unit.label(), ref_to = %ref_id, "Receipt for already processed message");
                self.msh
                    .storage
                    .set_processing_state(&mut entity, ProcessingState::Done)
                    .await?;
            } else {
                warn!(unit = %entity.unit.label(), ref_to = %ref_id, "Receipt for unknown message");
                self.fail(&mut entity, "referenced message unknown").await?;
            }
            return Ok(());
        };

        info!(unit = %user_message.unit.label(), "User Message acknowledged by Receipt");
        if let Some(pmode_id) = user_message.unit.pmode_id.as_deref() {
            self.msh.storage.set_pmode_id(&mut entity, pmode_id).await?;
        }
        self.msh
            .events
            .raise_event(MessageProcessingEvent::new(
                &user_message.unit,
                EventKind::ReceiptReceived {
                    receipt_message_id: entity.message_id().unwrap_or_default().to_string(),
                },
            ))
            .await;
        self.msh
            .storage
            .set_processing_state(&mut entity, ProcessingState::Done)
            .await
    }

    async fn process_error(&self, mut entity: MessageUnitEntity) -> Result<()> {
        let MessageUnitBody::Error(signal) = &entity.unit.body else {
            return Err(MshError::Internal("expected an Error signal".into()));
        };
        let signal: ErrorMessage = signal.clone();
        let target = match signal.severity() {
            Some(ErrorSeverity::Failure) => ProcessingState::Failure,
            _ => ProcessingState::Warning,
        };
        let description = signal
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");

        let mut references: Vec<String> = entity.unit.ref_to_message_id.iter().cloned().collect();
        for e in &signal.errors {
            if let Some(r) = &e.ref_to_message_in_error {
                if !references.contains(r) {
                    references.push(r.clone());
                }
            }
        }

        let mut reported = false;
        for ref_id in &references {
            let referenced = self
                .msh
                .query
                .get_message_units_with_id(ref_id, Some(Direction::Out))
                .await?;
            for mut unit in referenced {
                if unit.unit.states().is_closed() {
                    debug!(unit = %unit.unit.label(), "Error refers to message unit in final state");
                    continue;
                }
                warn!(unit = %unit.unit.label(), errors = %description, "Error received for message unit");
                self.msh
                    .storage
                    .set_processing_state_described(&mut unit, target, Some(description.as_str()))
                    .await?;
                if entity.unit.pmode_id.is_none() {
                    if let Some(pmode_id) = unit.unit.pmode_id.clone() {
                        self.msh.storage.set_pmode_id(&mut entity, &pmode_id).await?;
                    }
                }
                self.msh
                    .events
                    .raise_event(MessageProcessingEvent::new(
                        &unit.unit,
                        EventKind::ErrorReceived {
                            errors: signal.errors.clone(),
                        },
                    ))
                    .await;
                reported = true;
            }
        }

        if !reported {
            debug!(unit = %entity.unit.label(), errors = %description, "Error does not affect any pending message unit");
            self.msh
                .events
                .raise_event(MessageProcessingEvent::new(
                    &entity.unit,
                    EventKind::ErrorReceived {
                        errors: signal.errors.clone(),
                    },
                ))
                .await;
        }

        self.msh
            .storage
            .set_processing_state(&mut entity, ProcessingState::Done)
            .await
    }

    async fn process_pull_request(
        &self,
        pctx: &mut ProcessingContext,
        mut entity: MessageUnitEntity,
    ) -> Result<()> {
        let MessageUnitBody::PullRequest(request) = &entity.unit.body else {
            return Err(MshError::Internal("expected a Pull Request".into()));
        };
        let request = request.clone();

        if let Some((pmode_id, security)) = self.pull_flow(&request.mpc) {
            self.msh.storage.set_pmode_id(&mut entity, &pmode_id).await?;
            if let Some(security) = security.filter(|s| !s.is_empty()) {
                if let Err(e) = self.verify_security(&entity, &security).await {
                    self.fail(&mut entity, &e.message).await?;
                    return self
                        .reply_error(pctx, EbmsError::failed_authentication(), &entity, None)
                        .await;
                }
            }
        }

        let waiting = self
            .msh
            .query
            .get_for_pulling(&request.mpc, request.selection.as_ref(), &[])
            .await?;

        let mut pulled = None;
        for mut candidate in waiting {
            if self
                .msh
                .storage
                .set_processing_state_if(
                    &mut candidate,
                    ProcessingState::AwaitingPull,
                    ProcessingState::Processing,
                )
                .await?
            {
                pulled = Some(candidate);
                break;
            }
        }

        self.msh
            .storage
            .set_processing_state(&mut entity, ProcessingState::Done)
            .await?;

        match pulled {
            Some(mut user_message) if pctx.has_response_channel() => {
                info!(unit = %user_message.unit.label(), mpc = %request.mpc, "User Message pulled");
                self.msh.storage.add_related(&mut user_message, entity.core_id()).await?;
                pctx.add_response(user_message);
                Ok(())
            }
            Some(mut user_message) => {
                // nobody to return it to, leave it for the next Pull Request
                self.msh
                    .storage
                    .set_processing_state(&mut user_message, ProcessingState::AwaitingPull)
                    .await
            }
            None => {
                debug!(mpc = %request.mpc, "No message waiting to be pulled");
                let error = EbmsError::empty_mpc();
                self.reply_error(pctx, error, &entity, None).await
            }
        }
    }

    /// P-Mode id and security of the pull request flow serving the MPC
    fn pull_flow(&self, mpc: &str) -> Option<(String, Option<SecurityConfig>)> {
        self.msh.pmodes.all().into_iter().find_map(|pmode| {
            pmode.legs.iter().find_map(|leg| {
                leg.pull_request_flows
                    .iter()
                    .find(|f| f.mpc.as_deref().filter(|m| !m.is_empty()).unwrap_or(DEFAULT_MPC) == mpc)
                    .map(|f| (pmode.id.clone(), f.security.clone().or_else(|| leg.security.clone())))
            })
        })
    }

    async fn verify_security(
        &self,
        entity: &MessageUnitEntity,
        security: &SecurityConfig,
    ) -> std::result::Result<(), SecurityProcessingError> {
        match self.msh.security.verify_inbound(&entity.unit, security).await {
            Ok(results) => {
                for result in results
                    .into_iter()
                    .filter(|r| r.operation == SecurityOperation::SignatureVerification)
                {
                    self.msh
                        .events
                        .raise_event(MessageProcessingEvent::new(
                            &entity.unit,
                            EventKind::SignatureVerified {
                                algorithm: result.algorithm,
                                certificate: result.certificate,
                            },
                        ))
                        .await;
                }
                Ok(())
            }
            Err(e) => {
                warn!(unit = %entity.unit.label(), error = %e, "Security verification failed");
                self.msh
                    .events
                    .raise_event(MessageProcessingEvent::new(
                        &entity.unit,
                        EventKind::SecurityFailure {
                            reason: e.to_string(),
                        },
                    ))
                    .await;
                Err(e)
            }
        }
    }

    async fn create_receipt(
        &self,
        pctx: &mut ProcessingContext,
        user_message: &MessageUnitEntity,
        leg: &Leg,
        for_duplicate: bool,
    ) -> Result<()> {
        let ref_id = user_message.message_id().map(String::from);
        let mut receipt = MessageUnit::receipt(
            Receipt {
                content: ref_id.clone(),
            },
            ref_id,
        );
        receipt.pmode_id = user_message.unit.pmode_id.clone();
        let receipt = self.msh.storage.store_outgoing(receipt).await?;
        debug!(unit = %receipt.unit.label(), for_duplicate, "Created Receipt");

        self.msh
            .events
            .raise_event(MessageProcessingEvent::new(
                &user_message.unit,
                EventKind::ReceiptCreated {
                    receipt_message_id: receipt.message_id().unwrap_or_default().to_string(),
                    for_duplicate,
                },
            ))
            .await;

        let callback = leg
            .receipt
            .as_ref()
            .map_or(false, |r| r.reply_pattern == ReplyPattern::Callback);
        self.respond(pctx, receipt, callback).await
    }

    /// Create an Error signal about `in_reply_to` and send it back
    async fn reply_error(
        &self,
        pctx: &mut ProcessingContext,
        error: EbmsError,
        in_reply_to: &MessageUnitEntity,
        leg: Option<&Leg>,
    ) -> Result<()> {
        let ref_id = in_reply_to.message_id().map(String::from);
        let error = error.referencing(ref_id.as_deref());
        let mut signal = MessageUnit::error(ErrorMessage::new(vec![error]), ref_id);
        signal.pmode_id = in_reply_to.unit.pmode_id.clone();
        let signal = self.msh.storage.store_outgoing(signal).await?;

        let callback = leg
            .and_then(|l| l.error_handling.as_ref())
            .map_or(false, |e| e.reply_pattern == ReplyPattern::Callback);
        self.respond(pctx, signal, callback).await
    }

    /// Last resort answer after an unexpected failure
    async fn reply_generic_error(&self, pctx: &mut ProcessingContext, ref_id: Option<&str>) {
        let error = EbmsError::other()
            .with_description("Unexpected error while processing the message")
            .referencing(ref_id);
        let signal = MessageUnit::error(ErrorMessage::new(vec![error]), ref_id.map(String::from));
        match self.msh.storage.store_outgoing(signal).await {
            Ok(entity) if pctx.has_response_channel() => pctx.add_response(entity),
            Ok(mut entity) => {
                if let Err(e) = self
                    .msh
                    .storage
                    .set_processing_state(&mut entity, ProcessingState::Failure)
                    .await
                {
                    error!(error = %e, "Cannot close undeliverable Error signal");
                }
            }
            Err(e) => error!(error = %e, "Cannot create Error signal"),
        }
    }

    async fn respond(
        &self,
        pctx: &mut ProcessingContext,
        mut entity: MessageUnitEntity,
        callback: bool,
    ) -> Result<()> {
        if pctx.has_response_channel() && !callback {
            pctx.add_response(entity);
            return Ok(());
        }
        pctx.track(&entity);
        self.msh
            .storage
            .set_processing_state(&mut entity, ProcessingState::ReadyToPush)
            .await
    }

    async fn fail(&self, entity: &mut MessageUnitEntity, reason: &str) -> Result<()> {
        self.msh
            .storage
            .set_processing_state_described(entity, ProcessingState::Failure, Some(reason))
            .await
    }
}
