//! Processing Mode (P-Mode) configuration
//!
//! A P-Mode captures what trading partners agreed on for an exchange:
//! message exchange pattern and its binding, and per leg the reliability,
//! security, delivery and validation settings. P-Modes are read-only to the
//! processing engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::events::EventClass;
use super::message_unit::{MessageUnitClass, MessageUnitType};
use super::user_message::PartyId;
use super::validation::ValidationSeverity;

const EBMS_BINDING_NS: &str = "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/";
const CUSTOM_BINDING_MARKER: &str = "/mepBinding/";

/// Transport service used for the standard ebMS bindings
pub const DEFAULT_TRANSPORT_SERVICE: &str = "as4";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mep {
    #[default]
    OneWay,
    TwoWay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegLabel {
    Request,
    Reply,
}

/// Parsed MEP binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MepBinding {
    Push,
    Pull,
    PushAndPush,
    PushAndPull,
    PullAndPush,
    PullAndPull,
    /// Binding of the form `.../mepBinding/<name>`, served by transport `<name>`
    Custom(String),
}

impl MepBinding {
    /// Parse a binding URI; an empty string means the default push binding
    pub fn parse(uri: &str) -> Option<MepBinding> {
        if uri.is_empty() {
            return Some(MepBinding::Push);
        }
        if let Some(pos) = uri.rfind(CUSTOM_BINDING_MARKER) {
            let name = &uri[pos + CUSTOM_BINDING_MARKER.len()..];
            return (!name.is_empty()).then(|| MepBinding::Custom(name.to_string()));
        }
        let local = uri.strip_prefix(EBMS_BINDING_NS).unwrap_or(uri);
        match local {
            "push" => Some(MepBinding::Push),
            "pull" => Some(MepBinding::Pull),
            "pushAndPush" => Some(MepBinding::PushAndPush),
            "pushAndPull" => Some(MepBinding::PushAndPull),
            "pullAndPush" => Some(MepBinding::PullAndPush),
            "pullAndPull" => Some(MepBinding::PullAndPull),
            _ => None,
        }
    }

    /// Name of the transport service that implements this binding
    pub fn transport_service(&self) -> &str {
        match self {
            MepBinding::Custom(name) => name,
            _ => DEFAULT_TRANSPORT_SERVICE,
        }
    }

    /// Whether the User Message on the given leg is pulled by its receiver
    pub fn is_pulled(&self, leg: LegLabel) -> bool {
        match (self, leg) {
            (MepBinding::Pull, LegLabel::Request) => true,
            (MepBinding::PullAndPush, LegLabel::Request) => true,
            (MepBinding::PushAndPull, LegLabel::Reply) => true,
            (MepBinding::PullAndPull, _) => true,
            _ => false,
        }
    }

    pub fn is_two_way(&self) -> bool {
        matches!(
            self,
            MepBinding::PushAndPush
                | MepBinding::PushAndPull
                | MepBinding::PullAndPush
                | MepBinding::PullAndPull
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Milliseconds,
    #[default]
    Seconds,
    Minutes,
    Hours,
}

/// A duration as written in configuration (value + unit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub value: u64,
    #[serde(default)]
    pub unit: TimeUnit,
}

impl Interval {
    pub fn new(value: u64, unit: TimeUnit) -> Self {
        Self { value, unit }
    }

    pub fn as_millis(&self) -> u64 {
        let factor = match self.unit {
            TimeUnit::Milliseconds => 1,
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60_000,
            TimeUnit::Hours => 3_600_000,
        };
        self.value.saturating_mul(factor)
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.as_millis())
    }
}

/// AS4 reception awareness (retries + duplicate elimination)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceptionAwarenessConfig {
    pub max_retries: u32,
    pub retry_interval: Interval,
    #[serde(default = "default_true")]
    pub use_duplicate_detection: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyPattern {
    #[default]
    Response,
    Callback,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReceiptConfig {
    #[serde(default)]
    pub reply_pattern: ReplyPattern,
    /// Callback address, the leg's protocol address is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorHandlingConfig {
    #[serde(default)]
    pub reply_pattern: ReplyPattern,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningConfig {
    pub key_alias: String,
    #[serde(default = "default_signing_algorithm")]
    pub algorithm: String,
    #[serde(default)]
    pub include_certificate: bool,
}

fn default_signing_algorithm() -> String {
    "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionConfig {
    pub certificate_alias: String,
    #[serde(default = "default_encryption_algorithm")]
    pub algorithm: String,
}

fn default_encryption_algorithm() -> String {
    "http://www.w3.org/2009/xmlenc11#aes128-gcm".to_string()
}

/// Message level security settings of a leg or pull request flow
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing: Option<SigningConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionConfig>,
}

impl SecurityConfig {
    pub fn is_empty(&self) -> bool {
        self.signing.is_none() && self.encryption.is_none()
    }
}

/// Reference to a registered factory plus its settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FactoryConfig {
    pub factory: String,
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

/// How received User Messages are handed to the business application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub factory: FactoryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub id: String,
    #[serde(flatten)]
    pub factory: FactoryConfig,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CustomValidationConfig {
    #[serde(default)]
    pub validators: Vec<ValidatorConfig>,
    /// Severity at which the remaining validators are skipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_severity: Option<ValidationSeverity>,
    /// Severity at which the message gets rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_severity: Option<ValidationSeverity>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserMessageFlow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mpc: Option<String>,
    #[serde(default)]
    pub compress_payloads: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_validation: Option<CustomValidationConfig>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PullRequestFlow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityConfig>,
}

/// Event handler configuration. Empty filter lists match everything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventHandlerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub factory: FactoryConfig,
    #[serde(default)]
    pub applies_to: Vec<EventClass>,
    #[serde(default)]
    pub for_message_units: Vec<MessageUnitClass>,
}

impl EventHandlerConfig {
    pub fn new(factory: impl Into<String>) -> Self {
        Self {
            id: None,
            factory: FactoryConfig {
                factory: factory.into(),
                settings: HashMap::new(),
            },
            applies_to: Vec::new(),
            for_message_units: Vec::new(),
        }
    }

    pub fn handles_event(&self, class: EventClass) -> bool {
        self.applies_to.is_empty() || self.applies_to.iter().any(|c| class.is_a(*c))
    }

    pub fn handles_unit(&self, unit_type: MessageUnitType) -> bool {
        self.for_message_units.is_empty()
            || self.for_message_units.iter().any(|c| c.includes(unit_type))
    }

    /// Identifier used in logs
    pub fn name(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.factory.factory)
    }
}

/// One direction of a message exchange
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Leg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<LegLabel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ProtocolConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reception_awareness: Option<ReceptionAwarenessConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<ReceiptConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handling: Option<ErrorHandlingConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliverySpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message_flow: Option<UserMessageFlow>,
    #[serde(default)]
    pub pull_request_flows: Vec<PullRequestFlow>,
    #[serde(default)]
    pub event_handlers: Vec<EventHandlerConfig>,
}

impl Leg {
    pub fn address(&self) -> Option<&str> {
        self.protocol.as_ref().and_then(|p| p.address.as_deref())
    }

    pub fn custom_validation(&self) -> Option<&CustomValidationConfig> {
        self.user_message_flow
            .as_ref()
            .and_then(|f| f.custom_validation.as_ref())
    }

    pub fn compresses_payloads(&self) -> bool {
        self.user_message_flow
            .as_ref()
            .map_or(false, |f| f.compress_payloads)
    }

    pub fn uses_duplicate_detection(&self) -> bool {
        self.reception_awareness
            .as_ref()
            .map_or(false, |ra| ra.use_duplicate_detection)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PartnerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub party_ids: Vec<PartyId>,
}

/// A complete P-Mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PMode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agreement: Option<String>,
    #[serde(default)]
    pub mep: Mep,
    #[serde(default)]
    pub mep_binding: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator: Option<PartnerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder: Option<PartnerConfig>,
    pub legs: Vec<Leg>,
}

impl PMode {
    pub fn binding(&self) -> Option<MepBinding> {
        MepBinding::parse(&self.mep_binding)
    }

    /// The leg with the given label; the first leg serves as request leg
    pub fn leg(&self, label: LegLabel) -> Option<&Leg> {
        if let Some(leg) = self.legs.iter().find(|l| l.label == Some(label)) {
            return Some(leg);
        }
        match label {
            LegLabel::Request => self.legs.first(),
            LegLabel::Reply => self.legs.get(1),
        }
    }

    /// Check the structural consistency of the P-Mode
    pub fn check(&self) -> std::result::Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("P-Mode without id".to_string());
        }
        let binding = self
            .binding()
            .ok_or_else(|| format!("P-Mode {} has unknown MEP binding {}", self.id, self.mep_binding))?;
        let expected_legs = match self.mep {
            Mep::OneWay => 1,
            Mep::TwoWay => 2,
        };
        if self.legs.len() != expected_legs {
            return Err(format!(
                "P-Mode {} has {} legs, its MEP requires {}",
                self.id,
                self.legs.len(),
                expected_legs
            ));
        }
        if matches!(binding, MepBinding::Custom(_)) {
            return Ok(());
        }
        if binding.is_two_way() != (self.mep == Mep::TwoWay) {
            return Err(format!(
                "P-Mode {} combines MEP {:?} with binding {}",
                self.id, self.mep, self.mep_binding
            ));
        }
        Ok(())
    }
}
