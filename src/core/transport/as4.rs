//! AS4 push over HTTP
//!
//! Sends the packaged message unit in an HTTP POST to the receiving MSH and
//! processes the message units returned in the HTTP response.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::TransportService;
use crate::core::compression::compress_payloads;
use crate::core::context::MshContext;
use crate::core::pmode::leg_for;
use crate::core::processing::{finish_transmission, InboundProcessor};
use crate::core::providers::SecurityOperation;
use crate::domain::entities::pmode::DEFAULT_TRANSPORT_SERVICE;
use crate::domain::entities::{
    EventKind, Leg, MessageProcessingEvent, MessageUnit, MessageUnitEntity, MessageUnitType, PMode,
    ProcessingState,
};
use crate::error::{MshError, Result};

const USER_AGENT: &str = concat!("as4-msh/", env!("CARGO_PKG_VERSION"));

pub struct As4TransportService {
    msh: Arc<MshContext>,
    inbound: Arc<InboundProcessor>,
    client: Client,
}

impl As4TransportService {
    pub fn new(msh: Arc<MshContext>, inbound: Arc<InboundProcessor>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout * 4)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| MshError::Transport(format!("Cannot create HTTP client: {}", e)))?;
        Ok(Self {
            msh,
            inbound,
            client,
        })
    }

    /// Receipts and Errors go to their callback address when one is set
    fn destination(unit: &MessageUnit, leg: &Leg) -> Result<url::Url> {
        let callback = match unit.unit_type() {
            MessageUnitType::Receipt => leg.receipt.as_ref().and_then(|r| r.to.as_deref()),
            MessageUnitType::ErrorMessage => leg.error_handling.as_ref().and_then(|e| e.to.as_deref()),
            _ => None,
        };
        let address = callback
            .or_else(|| leg.address())
            .ok_or_else(|| MshError::InvalidPMode(format!("no destination address for {}", unit.label())))?;
        url::Url::parse(address)
            .map_err(|e| MshError::InvalidPMode(format!("invalid destination address {}: {}", address, e)))
    }

    /// Apply the configured message security. `false` when it failed and the
    /// unit was set to `FAILURE`.
    async fn secure(&self, entity: &mut MessageUnitEntity, leg: &Leg) -> Result<bool> {
        let Some(config) = leg.security.as_ref().filter(|s| !s.is_empty()) else {
            return Ok(true);
        };
        match self.msh.security.secure_outbound(&entity.unit, config).await {
            Ok(results) => {
                for result in results {
                    let kind = match result.operation {
                        SecurityOperation::Signing => EventKind::SignatureCreated {
                            algorithm: result.algorithm,
                            certificate: result.certificate,
                        },
                        SecurityOperation::Encryption => EventKind::EncryptionCreated {
                            algorithm: result.algorithm,
                            certificate: result.certificate,
                        },
                        _ => continue,
                    };
                    self.msh
                        .events
                        .raise_event(MessageProcessingEvent::new(&entity.unit, kind))
                        .await;
                }
                Ok(true)
            }
            Err(e) => {
                warn!(unit = %entity.unit.label(), error = %e, "Securing message failed");
                self.msh
                    .events
                    .raise_event(MessageProcessingEvent::new(
                        &entity.unit,
                        EventKind::SecurityFailure {
                            reason: e.to_string(),
                        },
                    ))
                    .await;
                self.msh
                    .storage
                    .set_processing_state_described(
                        entity,
                        ProcessingState::Failure,
                        Some(e.message.as_str()),
                    )
                    .await?;
                Ok(false)
            }
        }
    }

    /// POST the unit and return the message units found in the response
    async fn post(&self, destination: url::Url, unit: &MessageUnit) -> Result<Vec<MessageUnit>> {
        let packaged = self.msh.packager.package(std::slice::from_ref(unit)).await?;
        let response = self
            .client
            .post(destination)
            .header(CONTENT_TYPE, packaged.content_type)
            .body(packaged.body)
            .send()
            .await
            .map_err(|e| MshError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MshError::Transport(format!("receiving MSH answered with HTTP {}", status)));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response
            .bytes()
            .await
            .map_err(|e| MshError::Transport(e.to_string()))?;
        if body.is_empty() {
            return Ok(Vec::new());
        }
        let content_type = content_type.unwrap_or_default();
        self.msh.packager.unpackage(&content_type, &body).await
    }
}

#[async_trait]
impl TransportService for As4TransportService {
    fn name(&self) -> &str {
        DEFAULT_TRANSPORT_SERVICE
    }

    async fn send(&self, mut entity: MessageUnitEntity, pmode: Arc<PMode>) -> Result<()> {
        let leg = leg_for(&entity.unit, &pmode)
            .cloned()
            .ok_or_else(|| MshError::InvalidPMode(format!("P-Mode {} has no leg for {}", pmode.id, entity.unit.label())))?;
        let destination = Self::destination(&entity.unit, &leg)?;

        if leg.compresses_payloads() {
            if let Some(mut um) = entity.unit.as_user_message().cloned() {
                if compress_payloads(&mut um).await? > 0 {
                    self.msh
                        .storage
                        .set_payload_information(&mut entity, um.payloads)
                        .await?;
                }
            }
        }

        if !self.secure(&mut entity, &leg).await? {
            return Ok(());
        }

        self.msh
            .storage
            .set_processing_state(&mut entity, ProcessingState::Sending)
            .await?;
        debug!(unit = %entity.unit.label(), to = %destination, "Sending message unit");

        match self.post(destination, &entity.unit).await {
            Ok(received) => {
                info!(unit = %entity.unit.label(), responses = received.len(), "Message unit sent");
                finish_transmission(&self.msh, &mut entity, Some(&pmode), None).await?;
                if !received.is_empty() {
                    self.inbound.process_response(received).await;
                }
            }
            Err(e) => {
                finish_transmission(&self.msh, &mut entity, Some(&pmode), Some(e.to_string())).await?;
            }
        }
        Ok(())
    }
}
