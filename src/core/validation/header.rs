//! Structural checks of ebMS message headers

use std::collections::HashSet;

use crate::domain::entities::{MessageUnit, MessageUnitBody, TradingPartner};

/// Check the ebMS header rules for a received message unit.
///
/// Returns the list of violations, empty when the header is valid.
pub fn validate_header(unit: &MessageUnit) -> Vec<String> {
    let mut errors = Vec::new();

    if unit.message_id.as_deref().map_or(true, str::is_empty) {
        errors.push("MessageId is missing".to_string());
    }

    match &unit.body {
        MessageUnitBody::User(um) => {
            check_partner("From", &um.sender, &mut errors);
            check_partner("To", &um.receiver, &mut errors);
            let info = &um.collaboration_info;
            if info.service.name.trim().is_empty() {
                errors.push("Service is missing".to_string());
            }
            if info.action.trim().is_empty() {
                errors.push("Action is missing".to_string());
            }
            if info.conversation_id.trim().is_empty() {
                errors.push("ConversationId is missing".to_string());
            }
            let mut seen = HashSet::new();
            for payload in &um.payloads {
                if !seen.insert(payload.payload_id) {
                    errors.push(format!("Duplicate payload {}", payload.payload_id));
                }
            }
        }
        MessageUnitBody::PullRequest(_) => {
            if unit.ref_to_message_id.is_some() {
                errors.push("Pull Request must not reference another message".to_string());
            }
        }
        MessageUnitBody::Receipt(_) => {
            if unit.ref_to_message_id.is_none() {
                errors.push("Receipt does not reference a message".to_string());
            }
        }
        MessageUnitBody::Error(error) => {
            if error.errors.is_empty() {
                errors.push("Error signal without errors".to_string());
            }
            if unit.ref_to_message_id.is_none() && !error.refers_to_no_message() {
                errors.push("Error signal does not reference a message".to_string());
            }
        }
    }

    errors
}

fn check_partner(element: &str, partner: &TradingPartner, errors: &mut Vec<String>) {
    if partner.party_ids.is_empty() {
        errors.push(format!("{} has no PartyId", element));
    }
    if partner.role.trim().is_empty() {
        errors.push(format!("{} has no Role", element));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{
        CollaborationInfo, EbmsError, ErrorMessage, PartyId, PullRequest, Receipt, Service,
        UserMessage,
    };

    fn valid_user_message() -> MessageUnit {
        let partner = |role: &str, id: &str| TradingPartner::new(role, vec![PartyId::new(id)]);
        let info = CollaborationInfo {
            service: Service {
                name: "urn:service".into(),
                service_type: None,
            },
            action: "Deliver".into(),
            conversation_id: "c-1".into(),
            agreement_reference: None,
        };
        MessageUnit::user_message(UserMessage::new(
            partner("sender", "a"),
            partner("receiver", "b"),
            info,
        ))
        .with_message_id("m-1")
    }

    #[test]
    fn test_valid_user_message() {
        assert!(validate_header(&valid_user_message()).is_empty());
    }

    #[test]
    fn test_incomplete_user_message() {
        let mut unit = valid_user_message();
        unit.message_id = None;
        if let Some(um) = unit.as_user_message_mut() {
            um.receiver.party_ids.clear();
            um.collaboration_info.action.clear();
        }
        let errors = validate_header(&unit);
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_signal_references() {
        let pull = MessageUnit::pull_request(PullRequest::new(None)).with_message_id("p-1");
        assert!(validate_header(&pull).is_empty());

        let mut referencing_pull = pull.clone();
        referencing_pull.ref_to_message_id = Some("m-1".into());
        assert_eq!(validate_header(&referencing_pull).len(), 1);

        let receipt = MessageUnit::receipt(Receipt::default(), None).with_message_id("r-1");
        assert_eq!(validate_header(&receipt).len(), 1);

        let general = ErrorMessage::new(vec![EbmsError::other()]);
        let error = MessageUnit::error(general, None).with_message_id("e-1");
        assert!(validate_header(&error).is_empty());

        let specific = ErrorMessage::new(vec![EbmsError::other().referencing(Some("m-9"))]);
        let error = MessageUnit::error(specific, None).with_message_id("e-2");
        assert_eq!(validate_header(&error).len(), 1);
    }
}
