//! User Message entities
//!
//! Business documents exchanged between trading partners together with their
//! ebMS header information.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message_unit::CoreId;

/// The MPC used when a User Message does not name one
pub const DEFAULT_MPC: &str = "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/defaultMPC";

/// Identifier of a trading partner
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyId {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_type: Option<String>,
}

impl PartyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            id_type: None,
        }
    }

    pub fn with_type(id: impl Into<String>, id_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            id_type: Some(id_type.into()),
        }
    }
}

/// Sender or receiver of a User Message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradingPartner {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub party_ids: Vec<PartyId>,
}

impl TradingPartner {
    pub fn new(role: impl Into<String>, party_ids: Vec<PartyId>) -> Self {
        Self {
            role: role.into(),
            party_ids,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agreement_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmode_id: Option<String>,
}

/// Business context of a User Message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollaborationInfo {
    pub service: Service,
    pub action: String,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agreement_reference: Option<AgreementReference>,
}

/// Name/value pair attached to a message or payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            property_type: None,
        }
    }
}

/// Where the payload travels in the ebMS message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Containment {
    Body,
    Attachment,
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaReference {
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Reference to payload content of a User Message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub payload_id: Uuid,
    /// Message unit the payload belongs to, set when it gets linked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_core_id: Option<CoreId>,
    pub containment: Containment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_reference: Option<SchemaReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Local file holding the content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_location: Option<String>,
}

impl Payload {
    pub fn new(containment: Containment) -> Self {
        Self {
            payload_id: Uuid::new_v4(),
            parent_core_id: None,
            containment,
            uri: None,
            mime_type: None,
            properties: Vec::new(),
            schema_reference: None,
            description: None,
            content_location: None,
        }
    }

    pub fn with_content(mut self, location: impl Into<String>, mime_type: impl Into<String>) -> Self {
        self.content_location = Some(location.into());
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Set or replace a payload property
    pub fn set_property(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.properties.iter_mut().find(|p| p.name == name) {
            Some(p) => p.value = value,
            None => self.properties.push(Property::new(name, value)),
        }
    }
}

/// ebMS User Message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub sender: TradingPartner,
    pub receiver: TradingPartner,
    pub collaboration_info: CollaborationInfo,
    #[serde(default = "default_mpc", deserialize_with = "deserialize_mpc")]
    mpc: String,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub payloads: Vec<Payload>,
}

fn default_mpc() -> String {
    DEFAULT_MPC.to_string()
}

fn deserialize_mpc<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(normalize_mpc(value.as_deref()))
}

fn normalize_mpc(mpc: Option<&str>) -> String {
    match mpc {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => DEFAULT_MPC.to_string(),
    }
}

impl UserMessage {
    pub fn new(
        sender: TradingPartner,
        receiver: TradingPartner,
        collaboration_info: CollaborationInfo,
    ) -> Self {
        Self {
            sender,
            receiver,
            collaboration_info,
            mpc: DEFAULT_MPC.to_string(),
            properties: Vec::new(),
            payloads: Vec::new(),
        }
    }

    pub fn mpc(&self) -> &str {
        &self.mpc
    }

    /// Set the MPC, `None` or an empty string selects the default MPC
    pub fn set_mpc(&mut self, mpc: Option<&str>) {
        self.mpc = normalize_mpc(mpc);
    }

    pub fn with_mpc(mut self, mpc: Option<&str>) -> Self {
        self.set_mpc(mpc);
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payloads.push(payload);
        self
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}
