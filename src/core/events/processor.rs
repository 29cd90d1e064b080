//! Event processor
//!
//! Delivers each event to at most one handler. Handlers configured on the leg
//! of the subject's P-Mode are tried first, in configuration order, then the
//! global ones. The first handler whose filters match receives the event.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, warn};

use super::handler::{HandlerFactoryRegistry, MessageProcessingEventHandler};
use crate::core::pmode::{leg_label_for, PModeSet};
use crate::domain::entities::pmode::EventHandlerConfig;
use crate::domain::entities::{LegLabel, MessageProcessingEvent, PMode};
use crate::error::Result;

/// A handler configuration with its resolved handler instance
#[derive(Clone)]
pub struct ConfiguredHandler {
    pub config: EventHandlerConfig,
    pub handler: Arc<dyn MessageProcessingEventHandler>,
}

impl ConfiguredHandler {
    fn accepts(&self, event: &MessageProcessingEvent) -> bool {
        let Some(subject) = &event.subject else {
            return false;
        };
        self.config.handles_event(event.class()) && self.config.handles_unit(subject.unit_type())
    }
}

type LegKey = (String, LegLabel);

pub struct EventProcessor {
    registry: Arc<HandlerFactoryRegistry>,
    pmodes: Arc<PModeSet>,
    global: Vec<ConfiguredHandler>,
    per_leg: RwLock<HashMap<LegKey, Vec<ConfiguredHandler>>>,
}

impl EventProcessor {
    /// Create the processor, resolving the global handler configurations
    pub fn new(
        registry: Arc<HandlerFactoryRegistry>,
        pmodes: Arc<PModeSet>,
        global_handlers: &[EventHandlerConfig],
    ) -> Result<Self> {
        let global = resolve(&registry, global_handlers)?;
        Ok(Self {
            registry,
            pmodes,
            global,
            per_leg: RwLock::new(HashMap::new()),
        })
    }

    /// Resolve the handler configurations of all legs of a P-Mode
    pub fn configure_pmode(&self, pmode: &PMode) -> Result<()> {
        let mut resolved = Vec::new();
        for label in [LegLabel::Request, LegLabel::Reply] {
            if let Some(leg) = pmode.leg(label) {
                resolved.push(((pmode.id.clone(), label), resolve(&self.registry, &leg.event_handlers)?));
            }
        }
        let mut per_leg = self.per_leg.write().unwrap_or_else(|e| e.into_inner());
        per_leg.retain(|(id, _), _| *id != pmode.id);
        per_leg.extend(resolved);
        Ok(())
    }

    /// Resolve the handlers of every P-Mode in the set
    pub fn configure_all(&self) -> Result<()> {
        for pmode in self.pmodes.all() {
            self.configure_pmode(&pmode)?;
        }
        Ok(())
    }

    /// Hand the event to the first matching handler.
    ///
    /// Returns whether a handler took the event. A failing handler is logged and
    /// still counts as having handled it.
    pub async fn raise_event(&self, event: MessageProcessingEvent) -> bool {
        let Some(subject) = &event.subject else {
            warn!(event = %event.class(), "Dropping event without subject");
            return false;
        };

        let candidate = self
            .leg_handlers(subject)
            .into_iter()
            .find(|h| h.accepts(&event))
            .or_else(|| self.global.iter().find(|h| h.accepts(&event)).cloned());

        let Some(configured) = candidate else {
            debug!(event = %event.class(), subject = %subject.label(), "No handler for event");
            return false;
        };

        debug!(
            event = %event.class(),
            subject = %subject.label(),
            handler = %configured.config.name(),
            "Handling event"
        );
        if let Err(e) = configured.handler.handle_event(&event).await {
            error!(
                event = %event.class(),
                subject = %subject.label(),
                handler = %configured.config.name(),
                error = %e,
                "Event handler failed"
            );
        }
        true
    }

    fn leg_handlers(&self, subject: &crate::domain::entities::MessageUnit) -> Vec<ConfiguredHandler> {
        let Some(pmode_id) = subject.pmode_id.as_deref() else {
            return Vec::new();
        };
        let Some(pmode) = self.pmodes.get(pmode_id) else {
            return Vec::new();
        };
        let key = (pmode_id.to_string(), leg_label_for(subject, &pmode));

        if let Some(handlers) = self
            .per_leg
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            return handlers.clone();
        }

        // P-Mode added after startup
        if let Err(e) = self.configure_pmode(&pmode) {
            error!(pmode_id = %pmode_id, error = %e, "Cannot resolve event handlers of P-Mode");
            return Vec::new();
        }
        self.per_leg
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }
}

fn resolve(
    registry: &HandlerFactoryRegistry,
    configs: &[EventHandlerConfig],
) -> Result<Vec<ConfiguredHandler>> {
    configs
        .iter()
        .map(|config| {
            let handler = registry.create(&config.factory.factory, &config.factory.settings)?;
            Ok(ConfiguredHandler {
                config: config.clone(),
                handler,
            })
        })
        .collect()
}
