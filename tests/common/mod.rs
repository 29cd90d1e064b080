#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

// Test utilities and common setup
pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;

use as4_msh::core::clock::ManualClock;
use as4_msh::core::context::MshContext;
use as4_msh::core::events::{HandlerFactoryRegistry, MessageProcessingEventHandler};
use as4_msh::domain::entities::pmode::EventHandlerConfig;
use as4_msh::domain::entities::{MessageUnitEntity, PMode, ProcessingState};
use as4_msh::Result;

/// An MSH on a manual clock whose events are all recorded
pub struct TestMsh {
    pub msh: Arc<MshContext>,
    pub clock: Arc<ManualClock>,
    pub events: Arc<RecordingHandler>,
    pub dir: TempDir,
}

impl TestMsh {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let clock = Arc::new(ManualClock::default());
        let events = Arc::new(RecordingHandler::default());

        let mut handlers = HandlerFactoryRegistry::with_builtin();
        let recorder = events.clone();
        handlers.register(
            "recording",
            Arc::new(
                move |_: &HashMap<String, String>| -> Result<Arc<dyn MessageProcessingEventHandler>> {
                    Ok(recorder.clone())
                },
            ),
        );

        let msh = MshContext::builder()
            .clock(clock.clone())
            .handler_factories(handlers)
            .global_handlers(vec![EventHandlerConfig::new("recording")])
            .payload_dir(dir.path().join("payloads"))
            .build()
            .expect("context");

        Self {
            msh,
            clock,
            events,
            dir,
        }
    }

    pub fn with_pmode(self, pmode: PMode) -> Self {
        self.msh.deploy_pmode(pmode).expect("valid P-Mode");
        self
    }

    pub async fn reload(&self, entity: &MessageUnitEntity) -> MessageUnitEntity {
        self.msh
            .query
            .get_by_core_id(entity.core_id())
            .await
            .unwrap()
            .expect("message unit exists")
    }

    pub async fn state_of(&self, entity: &MessageUnitEntity) -> ProcessingState {
        self.reload(entity).await.current_state().expect("has a state")
    }
}
