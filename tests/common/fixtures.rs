use std::collections::HashMap;
use std::path::Path;

use as4_msh::domain::entities::pmode::{
    DeliverySpec, FactoryConfig, Interval, Mep, PartnerConfig, ProtocolConfig, PullRequestFlow, ReceiptConfig,
    ReceptionAwarenessConfig, ReplyPattern, TimeUnit,
};
use as4_msh::domain::entities::user_message::AgreementReference;
use as4_msh::domain::entities::{
    CollaborationInfo, Leg, MessageUnit, PMode, PartyId, Service, TradingPartner, UserMessage,
};

pub const EBMS_BINDING_NS: &str = "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/";
pub const AGREEMENT: &str = "urn:agreement:orders";

pub fn binding(name: &str) -> String {
    format!("{}{}", EBMS_BINDING_NS, name)
}

/// Test data fixtures for consistent test data
pub struct TestFixtures;

impl TestFixtures {
    pub fn seller() -> TradingPartner {
        TradingPartner::new("Seller", vec![PartyId::new("seller-001")])
    }

    pub fn buyer() -> TradingPartner {
        TradingPartner::new("Buyer", vec![PartyId::new("buyer-001")])
    }

    /// Order from the seller to the buyer under the test agreement
    pub fn order() -> UserMessage {
        let info = CollaborationInfo {
            service: Service {
                name: "urn:services:orders".into(),
                service_type: None,
            },
            action: "SubmitOrder".into(),
            conversation_id: "conversation-1".into(),
            agreement_reference: Some(AgreementReference {
                name: AGREEMENT.into(),
                agreement_type: None,
                pmode_id: None,
            }),
        };
        UserMessage::new(Self::seller(), Self::buyer(), info)
    }

    /// An order as it arrives from the seller's MSH
    pub fn received_order(message_id: &str) -> MessageUnit {
        MessageUnit::user_message(Self::order()).with_message_id(message_id)
    }

    /// One-way P-Mode between seller and buyer with a single default leg
    pub fn pmode(id: &str, binding_name: &str) -> PMode {
        PMode {
            id: id.into(),
            agreement: Some(AGREEMENT.into()),
            mep: Mep::OneWay,
            mep_binding: binding(binding_name),
            initiator: Some(PartnerConfig {
                role: Some("Seller".into()),
                party_ids: vec![PartyId::new("seller-001")],
            }),
            responder: Some(PartnerConfig {
                role: Some("Buyer".into()),
                party_ids: vec![PartyId::new("buyer-001")],
            }),
            legs: vec![Leg::default()],
        }
    }
}

/// Builder for the single leg of a test P-Mode
pub struct LegBuilder {
    leg: Leg,
}

impl LegBuilder {
    pub fn new() -> Self {
        Self { leg: Leg::default() }
    }

    pub fn address(mut self, address: &str) -> Self {
        self.leg.protocol = Some(ProtocolConfig {
            address: Some(address.to_string()),
        });
        self
    }

    pub fn reception_awareness(mut self, max_retries: u32, interval_secs: u64) -> Self {
        self.leg.reception_awareness = Some(ReceptionAwarenessConfig {
            max_retries,
            retry_interval: Interval::new(interval_secs, TimeUnit::Seconds),
            use_duplicate_detection: true,
        });
        self
    }

    pub fn receipt(mut self, reply_pattern: ReplyPattern) -> Self {
        self.leg.receipt = Some(ReceiptConfig {
            reply_pattern,
            to: None,
        });
        self
    }

    pub fn file_delivery(mut self, directory: &Path) -> Self {
        let mut settings = HashMap::new();
        settings.insert("directory".to_string(), directory.to_string_lossy().to_string());
        self.leg.delivery = Some(DeliverySpec {
            id: None,
            factory: FactoryConfig {
                factory: "file".into(),
                settings,
            },
        });
        self
    }

    pub fn pull_flow(mut self, mpc: Option<&str>) -> Self {
        self.leg.pull_request_flows.push(PullRequestFlow {
            mpc: mpc.map(String::from),
            security: None,
        });
        self
    }

    pub fn build(self) -> Leg {
        self.leg
    }
}

pub fn with_leg(mut pmode: PMode, leg: Leg) -> PMode {
    pmode.legs = vec![leg];
    pmode
}
