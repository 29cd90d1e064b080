//! Processing state model
//!
//! Every message unit carries an append-only list of processing states. The
//! last entry is the current state; once it is a final state the list is
//! closed and only deletion of the whole unit remains possible.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Processing states a message unit moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingState {
    /// Outbound unit accepted from the business application
    Submitted,
    /// Outbound signal created by the MSH itself
    Created,
    /// Inbound unit received from the counterparty
    Received,
    /// Waiting for the counterparty to pull it
    AwaitingPull,
    /// Waiting for the sender worker
    ReadyToPush,
    /// Claimed by a worker
    Processing,
    /// Handed to the transport
    Sending,
    /// The transport reported an error
    TransportFailure,
    /// Sent, waiting for a Receipt
    AwaitingReceipt,
    ReadyForDelivery,
    OutForDelivery,
    DeliveryFailed,
    /// Processed, but with a warning from the counterparty
    Warning,
    Suspended,
    Delivered,
    Done,
    Failure,
    Duplicate,
}

impl ProcessingState {
    /// Every state, in declaration order
    pub const ALL: [ProcessingState; 18] = [
        ProcessingState::Submitted,
        ProcessingState::Created,
        ProcessingState::Received,
        ProcessingState::AwaitingPull,
        ProcessingState::ReadyToPush,
        ProcessingState::Processing,
        ProcessingState::Sending,
        ProcessingState::TransportFailure,
        ProcessingState::AwaitingReceipt,
        ProcessingState::ReadyForDelivery,
        ProcessingState::OutForDelivery,
        ProcessingState::DeliveryFailed,
        ProcessingState::Warning,
        ProcessingState::Suspended,
        ProcessingState::Delivered,
        ProcessingState::Done,
        ProcessingState::Failure,
        ProcessingState::Duplicate,
    ];

    /// Whether no further transition is allowed out of this state
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            ProcessingState::Delivered
                | ProcessingState::Done
                | ProcessingState::Failure
                | ProcessingState::Duplicate
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Submitted => "SUBMITTED",
            ProcessingState::Created => "CREATED",
            ProcessingState::Received => "RECEIVED",
            ProcessingState::AwaitingPull => "AWAITING_PULL",
            ProcessingState::ReadyToPush => "READY_TO_PUSH",
            ProcessingState::Processing => "PROCESSING",
            ProcessingState::Sending => "SENDING",
            ProcessingState::TransportFailure => "TRANSPORT_FAILURE",
            ProcessingState::AwaitingReceipt => "AWAITING_RECEIPT",
            ProcessingState::ReadyForDelivery => "READY_FOR_DELIVERY",
            ProcessingState::OutForDelivery => "OUT_FOR_DELIVERY",
            ProcessingState::DeliveryFailed => "DELIVERY_FAILED",
            ProcessingState::Warning => "WARNING",
            ProcessingState::Suspended => "SUSPENDED",
            ProcessingState::Delivered => "DELIVERED",
            ProcessingState::Done => "DONE",
            ProcessingState::Failure => "FAILURE",
            ProcessingState::Duplicate => "DUPLICATE",
        }
    }

    /// Parse the wire/storage name of a state
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == name)
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a message unit's state history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStateEntry {
    pub state: ProcessingState,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProcessingStateEntry {
    pub fn new(state: ProcessingState, start_time: DateTime<Utc>) -> Self {
        Self {
            state,
            start_time,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Append-only, time ordered list of processing states
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateHistory {
    entries: Vec<ProcessingStateEntry>,
}

impl StateHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current (most recent) state entry
    pub fn current(&self) -> Option<&ProcessingStateEntry> {
        self.entries.last()
    }

    pub fn current_state(&self) -> Option<ProcessingState> {
        self.current().map(|e| e.state)
    }

    /// Whether the current state closes the history
    pub fn is_closed(&self) -> bool {
        self.current_state().map_or(false, |s| s.is_final())
    }

    /// Append a new state.
    ///
    /// Returns `false` without modifying the history when the current state is
    /// final. The start time is clamped to the previous entry's start time so
    /// the list stays ordered even when the clock steps backwards.
    pub fn push(&mut self, mut entry: ProcessingStateEntry) -> bool {
        if self.is_closed() {
            return false;
        }
        if let Some(last) = self.entries.last() {
            if entry.start_time < last.start_time {
                entry.start_time = last.start_time;
            }
        }
        self.entries.push(entry);
        true
    }

    /// Number of times the given state occurs in the history
    pub fn count(&self, state: ProcessingState) -> usize {
        self.entries.iter().filter(|e| e.state == state).count()
    }

    pub fn entries(&self) -> &[ProcessingStateEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_final_states() {
        let finals: Vec<_> = ProcessingState::ALL
            .iter()
            .filter(|s| s.is_final())
            .copied()
            .collect();
        assert_eq!(
            finals,
            vec![
                ProcessingState::Delivered,
                ProcessingState::Done,
                ProcessingState::Failure,
                ProcessingState::Duplicate
            ]
        );
    }

    #[test]
    fn test_state_names_round_trip_through_parse() {
        for state in ProcessingState::ALL {
            assert_eq!(ProcessingState::parse(state.as_str()), Some(state));
        }
        assert_eq!(ProcessingState::parse("INTERRUPTED"), None);
    }

    #[test]
    fn test_history_is_closed_after_final_state() {
        let now = Utc::now();
        let mut history = StateHistory::new();
        assert!(history.push(ProcessingStateEntry::new(ProcessingState::Submitted, now)));
        assert!(history.push(ProcessingStateEntry::new(ProcessingState::Failure, now)));
        assert!(!history.push(ProcessingStateEntry::new(ProcessingState::ReadyToPush, now)));

        assert_eq!(history.len(), 2);
        assert_eq!(history.current_state(), Some(ProcessingState::Failure));
    }

    #[test]
    fn test_history_start_times_never_decrease() {
        let now = Utc::now();
        let mut history = StateHistory::new();
        history.push(ProcessingStateEntry::new(ProcessingState::Submitted, now));
        history.push(ProcessingStateEntry::new(
            ProcessingState::ReadyToPush,
            now - Duration::seconds(10),
        ));

        let entries = history.entries();
        assert!(entries[0].start_time <= entries[1].start_time);
    }

    #[test]
    fn test_count_occurrences() {
        let now = Utc::now();
        let mut history = StateHistory::new();
        for state in [
            ProcessingState::Sending,
            ProcessingState::AwaitingReceipt,
            ProcessingState::Sending,
        ] {
            history.push(ProcessingStateEntry::new(state, now));
        }
        assert_eq!(history.count(ProcessingState::Sending), 2);
        assert_eq!(history.count(ProcessingState::Delivered), 0);
    }
}
