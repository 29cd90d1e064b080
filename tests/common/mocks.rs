use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use as4_msh::core::context::MshContext;
use as4_msh::core::events::MessageProcessingEventHandler;
use as4_msh::core::processing::finish_transmission;
use as4_msh::core::transport::TransportService;
use as4_msh::domain::entities::{EventClass, MessageProcessingEvent, MessageUnitEntity, PMode, ProcessingState};
use as4_msh::error::EventHandlingError;
use as4_msh::Result;

/// Event handler remembering every event it receives
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<MessageProcessingEvent>>,
}

impl RecordingHandler {
    pub fn events(&self) -> Vec<MessageProcessingEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn classes(&self) -> Vec<EventClass> {
        self.events().iter().map(|e| e.class()).collect()
    }

    pub fn count(&self, class: EventClass) -> usize {
        self.classes().into_iter().filter(|c| *c == class).count()
    }
}

#[async_trait]
impl MessageProcessingEventHandler for RecordingHandler {
    async fn handle_event(&self, event: &MessageProcessingEvent) -> std::result::Result<(), EventHandlingError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn handler_name(&self) -> &str {
        "recording"
    }
}

/// Transport that "sends" without a network: the transfer always succeeds
/// but no Receipt ever comes back
pub struct SilentTransport {
    msh: Arc<MshContext>,
    sent: AtomicUsize,
}

impl SilentTransport {
    pub fn new(msh: Arc<MshContext>) -> Self {
        Self {
            msh,
            sent: AtomicUsize::new(0),
        }
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportService for SilentTransport {
    fn name(&self) -> &str {
        "as4"
    }

    async fn send(&self, mut entity: MessageUnitEntity, pmode: Arc<PMode>) -> Result<()> {
        self.msh
            .storage
            .set_processing_state(&mut entity, ProcessingState::Sending)
            .await?;
        self.sent.fetch_add(1, Ordering::SeqCst);
        finish_transmission(&self.msh, &mut entity, Some(&pmode), None).await
    }
}
