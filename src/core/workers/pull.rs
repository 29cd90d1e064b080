//! Triggers Pull Requests
//!
//! For every P-Mode with pull request flows a Pull Request per MPC is queued
//! for the sender worker, unless one for that MPC is still on its way.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{list_parameter, Worker};
use crate::core::context::MshContext;
use crate::domain::entities::{
    Direction, MessageUnit, MessageUnitBody, MessageUnitType, PMode, ProcessingState, PullRequest,
    DEFAULT_MPC,
};
use crate::error::Result;

/// Comma separated P-Mode ids to pull for, all P-Modes when absent
pub const PMODES_PARAMETER: &str = "pmodes";

const PENDING_STATES: [ProcessingState; 4] = [
    ProcessingState::Submitted,
    ProcessingState::ReadyToPush,
    ProcessingState::Processing,
    ProcessingState::Sending,
];

pub struct PullWorker {
    msh: Arc<MshContext>,
    pmode_ids: Vec<String>,
}

impl PullWorker {
    pub fn new(msh: Arc<MshContext>, pmode_ids: Vec<String>) -> Self {
        Self { msh, pmode_ids }
    }

    pub fn from_parameters(msh: Arc<MshContext>, parameters: &HashMap<String, String>) -> Self {
        Self::new(msh, list_parameter(parameters, PMODES_PARAMETER))
    }

    /// MPCs the P-Mode pulls from
    fn mpcs(pmode: &PMode) -> Vec<String> {
        let mut mpcs = Vec::new();
        for leg in &pmode.legs {
            for flow in &leg.pull_request_flows {
                let mpc = flow
                    .mpc
                    .as_deref()
                    .or_else(|| leg.user_message_flow.as_ref().and_then(|f| f.mpc.as_deref()))
                    .filter(|m| !m.is_empty())
                    .unwrap_or(DEFAULT_MPC)
                    .to_string();
                if !mpcs.contains(&mpc) {
                    mpcs.push(mpc);
                }
            }
        }
        mpcs
    }

    async fn pull(&self, pmode: &PMode) -> Result<usize> {
        let pending = self
            .msh
            .query
            .get_message_units_in_state(
                &[MessageUnitType::PullRequest, MessageUnitType::SelectivePullRequest],
                Some(Direction::Out),
                std::slice::from_ref(&pmode.id),
                &PENDING_STATES,
            )
            .await?;

        let mut triggered = 0;
        for mpc in Self::mpcs(pmode) {
            let waiting = pending.iter().any(|e| {
                matches!(&e.unit.body, MessageUnitBody::PullRequest(pr) if pr.mpc == mpc)
            });
            if waiting {
                debug!(pmode = %pmode.id, mpc = %mpc, "Previous Pull Request still pending");
                continue;
            }

            let unit = MessageUnit::pull_request(PullRequest::new(Some(&mpc))).with_pmode_id(pmode.id.clone());
            let mut entity = self.msh.storage.store_outgoing(unit).await?;
            self.msh
                .storage
                .set_processing_state(&mut entity, ProcessingState::ReadyToPush)
                .await?;
            triggered += 1;
        }
        Ok(triggered)
    }
}

#[async_trait]
impl Worker for PullWorker {
    fn name(&self) -> &str {
        "pull"
    }

    async fn run(&self) -> Result<()> {
        let pmodes = self
            .msh
            .pmodes
            .all()
            .into_iter()
            .filter(|p| self.pmode_ids.is_empty() || self.pmode_ids.contains(&p.id));

        for pmode in pmodes {
            match self.pull(&pmode).await {
                Ok(0) => {}
                Ok(triggered) => info!(pmode = %pmode.id, triggered, "Triggered Pull Requests"),
                Err(e) => error!(pmode = %pmode.id, error = %e, "Cannot trigger Pull Request"),
            }
        }
        Ok(())
    }
}
