mod common;

use std::sync::Arc;

use as4_msh::domain::entities::{MessageUnit, ProcessingState};
use as4_msh::MshError;
use common::*;

#[tokio::test]
async fn test_history_only_grows() {
    let t = TestMsh::new();
    let mut entity = t
        .msh
        .storage
        .store_outgoing(MessageUnit::user_message(TestFixtures::order()))
        .await
        .unwrap();

    let storage = &t.msh.storage;
    for state in [
        ProcessingState::ReadyToPush,
        ProcessingState::Processing,
        ProcessingState::Sending,
        ProcessingState::AwaitingReceipt,
    ] {
        t.clock.advance(chrono::Duration::seconds(1));
        storage.set_processing_state(&mut entity, state).await.unwrap();
    }

    let stored = t.reload(&entity).await;
    let states: Vec<_> = stored.unit.states().entries().iter().map(|e| e.state).collect();
    assert_eq!(
        states,
        vec![
            ProcessingState::Submitted,
            ProcessingState::ReadyToPush,
            ProcessingState::Processing,
            ProcessingState::Sending,
            ProcessingState::AwaitingReceipt,
        ]
    );

    let times: Vec<_> = stored.unit.states().entries().iter().map(|e| e.start_time).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(stored.current_state(), Some(ProcessingState::AwaitingReceipt));
}

#[tokio::test]
async fn test_only_one_concurrent_claim_succeeds() {
    let t = TestMsh::new();
    let mut entity = t
        .msh
        .storage
        .store_outgoing(MessageUnit::user_message(TestFixtures::order()))
        .await
        .unwrap();
    t.msh
        .storage
        .set_processing_state(&mut entity, ProcessingState::ReadyToPush)
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let msh = t.msh.clone();
        let mut copy = entity.clone();
        tasks.push(tokio::spawn(async move {
            msh.storage
                .set_processing_state_if(&mut copy, ProcessingState::ReadyToPush, ProcessingState::Processing)
                .await
                .unwrap()
        }));
    }

    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let stored = t.reload(&entity).await;
    assert_eq!(stored.unit.states().count(ProcessingState::Processing), 1);
}

#[tokio::test]
async fn test_stale_copy_cannot_claim() {
    let t = TestMsh::new();
    let mut entity = t
        .msh
        .storage
        .store_outgoing(MessageUnit::user_message(TestFixtures::order()))
        .await
        .unwrap();
    t.msh
        .storage
        .set_processing_state(&mut entity, ProcessingState::ReadyToPush)
        .await
        .unwrap();

    let mut first = entity.clone();
    let mut second = entity.clone();
    assert!(t
        .msh
        .storage
        .set_processing_state_if(&mut first, ProcessingState::ReadyToPush, ProcessingState::Processing)
        .await
        .unwrap());
    assert!(!t
        .msh
        .storage
        .set_processing_state_if(&mut second, ProcessingState::ReadyToPush, ProcessingState::Processing)
        .await
        .unwrap());

    // the loser sees what actually happened
    assert_eq!(second.current_state(), Some(ProcessingState::Processing));
}

#[tokio::test]
async fn test_final_states_are_closed() {
    let t = TestMsh::new();
    for final_state in [
        ProcessingState::Delivered,
        ProcessingState::Done,
        ProcessingState::Failure,
        ProcessingState::Duplicate,
    ] {
        let mut entity = t
            .msh
            .storage
            .store_incoming(TestFixtures::received_order(&format!("closed-{}", final_state)))
            .await
            .unwrap();
        t.msh
            .storage
            .set_processing_state(&mut entity, final_state)
            .await
            .unwrap();

        let result = t
            .msh
            .storage
            .set_processing_state(&mut entity, ProcessingState::Processing)
            .await;
        assert!(matches!(result, Err(MshError::InvalidStateTransition { .. })));

        let moved = t
            .msh
            .storage
            .set_processing_state_if(&mut entity, final_state, ProcessingState::Received)
            .await
            .unwrap();
        assert!(!moved);
        assert_eq!(t.state_of(&entity).await, final_state);
    }
}

#[tokio::test]
async fn test_store_assigns_ids_and_initial_states() {
    let t = TestMsh::new();
    let storage = Arc::clone(&t.msh.storage);

    let submitted = storage
        .store_outgoing(MessageUnit::user_message(TestFixtures::order()))
        .await
        .unwrap();
    assert!(submitted.message_id().is_some());
    assert_eq!(submitted.current_state(), Some(ProcessingState::Submitted));

    let received = storage
        .store_incoming(TestFixtures::received_order("incoming-1"))
        .await
        .unwrap();
    assert_eq!(received.message_id(), Some("incoming-1"));
    assert_eq!(received.current_state(), Some(ProcessingState::Received));
    assert_ne!(submitted.core_id(), received.core_id());
}
