//! Packaging of message units into HTTP message bodies
//!
//! The SOAP/MIME envelope of ebMS is produced by an external packager. The
//! JSON packager below carries the same information and is used between two
//! instances of this MSH and in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

use crate::domain::entities::{MessageUnit, MessageUnitBody};
use crate::error::{MshError, Result};

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Serialized form of one or more message units
#[derive(Debug, Clone, PartialEq)]
pub struct PackagedMessage {
    pub content_type: String,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait MessagePackager: Send + Sync {
    /// Package message units, including the payload content they reference
    async fn package(&self, units: &[MessageUnit]) -> Result<PackagedMessage>;

    /// Extract the message units from a received message. Payload content is
    /// stored by the packager and referenced from the returned payloads.
    async fn unpackage(&self, content_type: &str, body: &[u8]) -> Result<Vec<MessageUnit>>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    message_units: Vec<WireUnit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<Attachment>,
}

/// Only the header information travels, processing meta-data stays local
#[derive(Debug, Serialize, Deserialize)]
struct WireUnit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ref_to_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
    body: MessageUnitBody,
}

#[derive(Debug, Serialize, Deserialize)]
struct Attachment {
    payload_id: Uuid,
    content: Vec<u8>,
}

pub struct JsonPackager {
    payload_dir: PathBuf,
}

impl JsonPackager {
    /// `payload_dir` receives the payload content of unpackaged messages
    pub fn new(payload_dir: impl Into<PathBuf>) -> Self {
        Self {
            payload_dir: payload_dir.into(),
        }
    }
}

#[async_trait]
impl MessagePackager for JsonPackager {
    async fn package(&self, units: &[MessageUnit]) -> Result<PackagedMessage> {
        let mut envelope = Envelope {
            message_units: Vec::with_capacity(units.len()),
            attachments: Vec::new(),
        };

        for unit in units {
            let mut body = unit.body.clone();
            if let MessageUnitBody::User(um) = &mut body {
                for payload in um.payloads.iter_mut() {
                    payload.parent_core_id = None;
                    if let Some(location) = payload.content_location.take() {
                        let content = tokio::fs::read(&location).await.map_err(|e| {
                            MshError::Packaging(format!("Cannot read payload {}: {}", location, e))
                        })?;
                        envelope.attachments.push(Attachment {
                            payload_id: payload.payload_id,
                            content,
                        });
                    }
                }
            }
            envelope.message_units.push(WireUnit {
                message_id: unit.message_id.clone(),
                ref_to_message_id: unit.ref_to_message_id.clone(),
                timestamp: unit.timestamp,
                body,
            });
        }

        Ok(PackagedMessage {
            content_type: JSON_CONTENT_TYPE.to_string(),
            body: serde_json::to_vec(&envelope)?,
        })
    }

    async fn unpackage(&self, content_type: &str, body: &[u8]) -> Result<Vec<MessageUnit>> {
        if !content_type.starts_with(JSON_CONTENT_TYPE) {
            return Err(MshError::Packaging(format!(
                "Unsupported content type: {}",
                content_type
            )));
        }
        let envelope: Envelope = serde_json::from_slice(body)?;

        if !envelope.attachments.is_empty() {
            tokio::fs::create_dir_all(&self.payload_dir).await?;
        }

        let mut units = Vec::with_capacity(envelope.message_units.len());
        for wire in envelope.message_units {
            let mut unit = MessageUnit::new(wire.body);
            unit.message_id = wire.message_id;
            unit.ref_to_message_id = wire.ref_to_message_id;
            unit.timestamp = wire.timestamp;

            if let Some(um) = unit.as_user_message_mut() {
                for payload in um.payloads.iter_mut() {
                    payload.parent_core_id = None;
                    payload.content_location = None;
                    if let Some(attachment) = envelope
                        .attachments
                        .iter()
                        .find(|a| a.payload_id == payload.payload_id)
                    {
                        let target = self.payload_dir.join(format!("{}", Uuid::new_v4()));
                        tokio::fs::write(&target, &attachment.content).await?;
                        payload.content_location = Some(target.to_string_lossy().into_owned());
                    }
                }
            }
            units.push(unit);
        }

        debug!(count = units.len(), "Unpackaged message units");
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{
        CollaborationInfo, Containment, Payload, Receipt, TradingPartner, UserMessage,
    };

    #[tokio::test]
    async fn test_payload_content_travels_with_the_message() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.txt");
        tokio::fs::write(&source, b"hello").await.unwrap();

        let um = UserMessage::new(
            TradingPartner::default(),
            TradingPartner::default(),
            CollaborationInfo::default(),
        )
        .with_payload(Payload::new(Containment::Body).with_content(source.to_string_lossy(), "text/plain"));
        let sent = MessageUnit::user_message(um).with_message_id("m-1");
        let receipt = MessageUnit::receipt(Receipt::default(), Some("m-0".into())).with_message_id("r-1");

        let packager = JsonPackager::new(dir.path().join("received"));
        let packaged = packager.package(&[sent.clone(), receipt]).await.unwrap();
        let received = packager
            .unpackage(&packaged.content_type, &packaged.body)
            .await
            .unwrap();

        assert_eq!(received.len(), 2);
        assert_ne!(received[0].core_id(), sent.core_id());
        assert_eq!(received[0].message_id.as_deref(), Some("m-1"));
        assert_eq!(received[1].ref_to_message_id.as_deref(), Some("m-0"));

        let payload = &received[0].as_user_message().unwrap().payloads[0];
        assert!(payload.parent_core_id.is_none());
        let content = tokio::fs::read(payload.content_location.as_ref().unwrap())
            .await
            .unwrap();
        assert_eq!(content, b"hello");
    }

    #[tokio::test]
    async fn test_unknown_content_type() {
        let packager = JsonPackager::new(std::env::temp_dir());
        assert!(matches!(
            packager.unpackage("multipart/related", b"").await,
            Err(MshError::Packaging(_))
        ));
    }
}
