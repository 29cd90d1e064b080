//! Shared services of a running MSH
//!
//! Built once at startup and handed to every worker, transport service and
//! processor at construction.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::core::clock::{Clock, SystemClock};
use crate::core::delivery::DeliveryRegistry;
use crate::core::events::{EventProcessor, HandlerFactoryRegistry};
use crate::core::persistence::{QueryManager, StorageManager};
use crate::core::pmode::PModeSet;
use crate::core::providers::{
    JsonPackager, MessagePackager, SecurityProvider, UnsupportedSecurityProvider,
};
use crate::core::validation::{CustomValidationExecutor, ValidatorRegistry};
use crate::domain::entities::pmode::EventHandlerConfig;
use crate::domain::entities::PMode;
use crate::error::Result;
use crate::storage::{InMemoryStorageProvider, StorageProvider};

pub struct MshContext {
    pub clock: Arc<dyn Clock>,
    pub storage: Arc<StorageManager>,
    pub query: QueryManager,
    pub pmodes: Arc<PModeSet>,
    pub events: Arc<EventProcessor>,
    pub validation: Arc<CustomValidationExecutor>,
    pub delivery: Arc<DeliveryRegistry>,
    pub security: Arc<dyn SecurityProvider>,
    pub packager: Arc<dyn MessagePackager>,
    /// Directory for payload content held by the MSH
    pub payload_dir: PathBuf,
}

impl MshContext {
    pub fn builder() -> MshContextBuilder {
        MshContextBuilder::default()
    }

    /// Add or replace a P-Mode and resolve the handlers, validators and
    /// deliverers it names
    pub fn deploy_pmode(&self, pmode: PMode) -> Result<()> {
        self.events.configure_pmode(&pmode)?;
        self.validation.configure_pmode(&pmode)?;
        self.delivery.configure_pmode(&pmode)?;
        self.pmodes.add(pmode)
    }
}

#[derive(Default)]
pub struct MshContextBuilder {
    provider: Option<Arc<dyn StorageProvider>>,
    clock: Option<Arc<dyn Clock>>,
    pmodes: Option<Arc<PModeSet>>,
    handler_factories: Option<HandlerFactoryRegistry>,
    validator_factories: Option<ValidatorRegistry>,
    delivery: Option<DeliveryRegistry>,
    security: Option<Arc<dyn SecurityProvider>>,
    packager: Option<Arc<dyn MessagePackager>>,
    global_handlers: Vec<EventHandlerConfig>,
    payload_dir: Option<PathBuf>,
    message_id_domain: Option<String>,
}

impl MshContextBuilder {
    pub fn storage_provider(mut self, provider: Arc<dyn StorageProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn pmodes(mut self, pmodes: Arc<PModeSet>) -> Self {
        self.pmodes = Some(pmodes);
        self
    }

    pub fn handler_factories(mut self, registry: HandlerFactoryRegistry) -> Self {
        self.handler_factories = Some(registry);
        self
    }

    pub fn validator_factories(mut self, registry: ValidatorRegistry) -> Self {
        self.validator_factories = Some(registry);
        self
    }

    pub fn delivery(mut self, registry: DeliveryRegistry) -> Self {
        self.delivery = Some(registry);
        self
    }

    pub fn security_provider(mut self, provider: Arc<dyn SecurityProvider>) -> Self {
        self.security = Some(provider);
        self
    }

    pub fn packager(mut self, packager: Arc<dyn MessagePackager>) -> Self {
        self.packager = Some(packager);
        self
    }

    pub fn global_handlers(mut self, handlers: Vec<EventHandlerConfig>) -> Self {
        self.global_handlers = handlers;
        self
    }

    pub fn payload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.payload_dir = Some(dir.into());
        self
    }

    pub fn message_id_domain(mut self, domain: impl Into<String>) -> Self {
        self.message_id_domain = Some(domain.into());
        self
    }

    /// Wire up the services. All factory names used by the global handlers
    /// and the P-Modes loaded so far are resolved here.
    pub fn build(self) -> Result<Arc<MshContext>> {
        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(InMemoryStorageProvider::default()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let pmodes = self.pmodes.unwrap_or_default();
        let payload_dir = self
            .payload_dir
            .unwrap_or_else(|| std::env::temp_dir().join("as4-msh").join("payloads"));

        let mut storage = StorageManager::new(provider.clone(), clock.clone());
        if let Some(domain) = self.message_id_domain {
            storage = storage.with_message_id_domain(domain);
        }

        let events = Arc::new(EventProcessor::new(
            Arc::new(self.handler_factories.unwrap_or_default()),
            pmodes.clone(),
            &self.global_handlers,
        )?);
        events.configure_all()?;

        let validation = Arc::new(CustomValidationExecutor::new(
            Arc::new(self.validator_factories.unwrap_or_default()),
            pmodes.clone(),
            events.clone(),
        ));
        validation.configure_all()?;

        let delivery = Arc::new(self.delivery.unwrap_or_default());
        for pmode in pmodes.all() {
            delivery.configure_pmode(&pmode)?;
        }

        info!(
            storage = provider.backend_name(),
            pmodes = pmodes.len(),
            "MSH context initialized"
        );

        Ok(Arc::new(MshContext {
            clock,
            storage: Arc::new(storage),
            query: QueryManager::new(provider),
            pmodes,
            events,
            validation,
            delivery,
            security: self
                .security
                .unwrap_or_else(|| Arc::new(UnsupportedSecurityProvider)),
            packager: self
                .packager
                .unwrap_or_else(|| Arc::new(JsonPackager::new(payload_dir.join("received")))),
            payload_dir,
        }))
    }
}
