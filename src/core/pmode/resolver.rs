use std::sync::Arc;
use tracing::debug;

use super::PModeSet;
use crate::domain::entities::pmode::{Mep, PartnerConfig};
use crate::domain::entities::{
    Leg, LegLabel, MessageUnit, MessageUnitBody, PMode, TradingPartner, UserMessage,
};

/// Label of the leg that governs the given message unit.
///
/// On a two-way MEP a User Message that responds to another message travels on
/// the reply leg. A Pull Request belongs to the leg whose User Message it pulls.
pub fn leg_label_for(unit: &MessageUnit, pmode: &PMode) -> LegLabel {
    match &unit.body {
        MessageUnitBody::User(_)
            if pmode.mep == Mep::TwoWay && unit.ref_to_message_id.is_some() =>
        {
            LegLabel::Reply
        }
        MessageUnitBody::PullRequest(_) => match pmode.binding() {
            Some(binding) if binding.is_two_way() && !binding.is_pulled(LegLabel::Request) => {
                LegLabel::Reply
            }
            _ => LegLabel::Request,
        },
        _ => LegLabel::Request,
    }
}

pub fn leg_for<'a>(unit: &MessageUnit, pmode: &'a PMode) -> Option<&'a Leg> {
    pmode.leg(leg_label_for(unit, pmode))
}

/// Find the P-Mode that governs a received User Message.
///
/// A P-Mode id in the agreement reference wins. Otherwise the agreement name
/// and the parties must single out exactly one P-Mode.
pub fn find_for_user_message(pmodes: &PModeSet, um: &UserMessage) -> Option<Arc<PMode>> {
    let agreement = um.collaboration_info.agreement_reference.as_ref();
    if let Some(id) = agreement.and_then(|a| a.pmode_id.as_deref()) {
        if let Some(pmode) = pmodes.get(id) {
            return Some(pmode);
        }
        debug!(pmode_id = %id, "Referenced P-Mode is unknown, trying to match");
    }

    let mut candidates = pmodes.all().into_iter().filter(|pmode| {
        let agreement_matches = match (&pmode.agreement, agreement) {
            (Some(expected), Some(actual)) => *expected == actual.name,
            (Some(_), None) => false,
            (None, _) => true,
        };
        agreement_matches
            && partner_matches(pmode.initiator.as_ref(), &um.sender)
            && partner_matches(pmode.responder.as_ref(), &um.receiver)
    });

    let first = candidates.next()?;
    if candidates.next().is_some() {
        debug!("User Message matches multiple P-Modes");
        return None;
    }
    Some(first)
}

fn partner_matches(config: Option<&PartnerConfig>, partner: &TradingPartner) -> bool {
    let Some(config) = config else {
        return true;
    };
    if let Some(role) = &config.role {
        if *role != partner.role {
            return false;
        }
    }
    config.party_ids.is_empty() || partner.party_ids.iter().any(|p| config.party_ids.contains(p))
}
