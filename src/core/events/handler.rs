//! Event handler traits and the factory registry
//!
//! Handlers are named in configuration by factory name. The names are resolved
//! against the registry when the configuration is loaded so a typo fails at
//! startup instead of when the first event is raised.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::entities::MessageProcessingEvent;
use crate::error::{EventHandlingError, MshError, Result};

#[async_trait]
pub trait MessageProcessingEventHandler: Send + Sync {
    async fn handle_event(&self, event: &MessageProcessingEvent) -> std::result::Result<(), EventHandlingError>;

    fn handler_name(&self) -> &str;
}

/// Creates configured handler instances
pub trait EventHandlerFactory: Send + Sync {
    fn create(
        &self,
        settings: &HashMap<String, String>,
    ) -> Result<Arc<dyn MessageProcessingEventHandler>>;
}

impl<F> EventHandlerFactory for F
where
    F: Fn(&HashMap<String, String>) -> Result<Arc<dyn MessageProcessingEventHandler>> + Send + Sync,
{
    fn create(
        &self,
        settings: &HashMap<String, String>,
    ) -> Result<Arc<dyn MessageProcessingEventHandler>> {
        self(settings)
    }
}

pub struct HandlerFactoryRegistry {
    factories: HashMap<String, Arc<dyn EventHandlerFactory>>,
}

impl HandlerFactoryRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in `log` handler
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("log", Arc::new(LogEventHandlerFactory));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: Arc<dyn EventHandlerFactory>) {
        let name = name.into();
        if self.factories.insert(name.clone(), factory).is_some() {
            warn!(factory = %name, "Replaced event handler factory");
        }
    }

    pub fn create(
        &self,
        name: &str,
        settings: &HashMap<String, String>,
    ) -> Result<Arc<dyn MessageProcessingEventHandler>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            MshError::Configuration(format!("Unknown event handler factory: {}", name))
        })?;
        factory.create(settings)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for HandlerFactoryRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

/// Writes every event it receives to the log. Setting `level` selects
/// `info` (default), `warn` or `error`.
pub struct LogEventHandler {
    level: tracing::Level,
}

#[async_trait]
impl MessageProcessingEventHandler for LogEventHandler {
    async fn handle_event(&self, event: &MessageProcessingEvent) -> std::result::Result<(), EventHandlingError> {
        let subject = event
            .subject
            .as_ref()
            .map(|s| s.label())
            .unwrap_or_default();
        let message = event.message.as_deref().unwrap_or("");
        match self.level {
            tracing::Level::ERROR => {
                error!(event = %event.class(), subject = %subject, "{}", message)
            }
            tracing::Level::WARN => {
                warn!(event = %event.class(), subject = %subject, "{}", message)
            }
            _ => info!(event = %event.class(), subject = %subject, "{}", message),
        }
        Ok(())
    }

    fn handler_name(&self) -> &str {
        "log"
    }
}

struct LogEventHandlerFactory;

impl EventHandlerFactory for LogEventHandlerFactory {
    fn create(
        &self,
        settings: &HashMap<String, String>,
    ) -> Result<Arc<dyn MessageProcessingEventHandler>> {
        let level = match settings.get("level").map(|l| l.to_lowercase()).as_deref() {
            None | Some("info") => tracing::Level::INFO,
            Some("warn") => tracing::Level::WARN,
            Some("error") => tracing::Level::ERROR,
            Some(other) => {
                return Err(MshError::Configuration(format!(
                    "Invalid level for log event handler: {}",
                    other
                )))
            }
        };
        Ok(Arc::new(LogEventHandler { level }))
    }
}
