//! Transport of message units to their receiving MSH
//!
//! The dispatcher selects the transport service named by the P-Mode's MEP
//! binding. `as4` is the built-in HTTP push service; custom bindings of the
//! form `.../mepBinding/<name>` are served by a service registered as
//! `<name>`.

pub mod as4;

pub use as4::As4TransportService;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::domain::entities::{MessageUnitEntity, PMode};
use crate::error::{MshError, Result};

#[async_trait]
pub trait TransportService: Send + Sync {
    fn name(&self) -> &str;

    /// Send the message unit and record the outcome in its processing state
    async fn send(&self, entity: MessageUnitEntity, pmode: Arc<PMode>) -> Result<()>;
}

#[derive(Default)]
pub struct TransportDispatcher {
    services: RwLock<HashMap<String, Arc<dyn TransportService>>>,
}

impl TransportDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, service: Arc<dyn TransportService>) {
        if let Ok(mut services) = self.services.write() {
            debug!(service = service.name(), "Registered transport service");
            services.insert(service.name().to_string(), service);
        }
    }

    pub fn service_for(&self, pmode: &PMode) -> Option<Arc<dyn TransportService>> {
        let binding = pmode.binding()?;
        self.services
            .read()
            .ok()?
            .get(binding.transport_service())
            .cloned()
    }

    /// Hand the message unit to the transport service of its P-Mode.
    ///
    /// An error means the unit was not handed over and its state was left
    /// as it was.
    pub async fn dispatch(&self, entity: MessageUnitEntity, pmode: Arc<PMode>) -> Result<()> {
        let Some(service) = self.service_for(&pmode) else {
            warn!(pmode = %pmode.id, binding = %pmode.mep_binding, "No transport service for binding");
            return Err(MshError::Transport(format!(
                "no transport service for binding '{}' of P-Mode {}",
                pmode.mep_binding, pmode.id
            )));
        };
        debug!(unit = %entity.unit.label(), service = service.name(), "Dispatching message unit");
        service.send(entity, pmode).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::pmode::Mep;
    use crate::domain::entities::{Leg, MessageUnit, PullRequest};
    use chrono::Utc;
    use std::sync::Mutex;

    struct RecordingTransport {
        name: String,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TransportService for RecordingTransport {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, entity: MessageUnitEntity, _pmode: Arc<PMode>) -> Result<()> {
            self.sent.lock().unwrap().push(entity.unit.label());
            Ok(())
        }
    }

    fn pmode(binding: &str) -> Arc<PMode> {
        Arc::new(PMode {
            id: "pm-dispatch".into(),
            agreement: None,
            mep: Mep::OneWay,
            mep_binding: binding.into(),
            initiator: None,
            responder: None,
            legs: vec![Leg::default()],
        })
    }

    #[tokio::test]
    async fn test_dispatch_selects_service_by_binding() {
        let dispatcher = TransportDispatcher::new();
        let sftp = Arc::new(RecordingTransport {
            name: "sftp".into(),
            sent: Mutex::new(Vec::new()),
        });
        dispatcher.register(sftp.clone());

        let entity = MessageUnitEntity::new(MessageUnit::pull_request(PullRequest::new(None)), Utc::now());
        dispatcher
            .dispatch(entity.clone(), pmode("http://example.org/mepBinding/sftp"))
            .await
            .unwrap();
        assert_eq!(sftp.sent.lock().unwrap().len(), 1);

        // nothing registered for the default push binding
        let err = dispatcher.dispatch(entity, pmode("")).await.unwrap_err();
        assert!(matches!(err, MshError::Transport(_)));
    }
}
