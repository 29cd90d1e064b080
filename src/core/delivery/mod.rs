//! Delivery of received User Messages to the business application

pub mod file;

pub use file::FileDeliverer;

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::domain::entities::pmode::DeliverySpec;
use crate::domain::entities::{MessageUnit, PMode};
use crate::error::{MessageDeliveryError, MshError, Result};

#[async_trait]
pub trait MessageDeliverer: Send + Sync {
    async fn deliver(&self, unit: &MessageUnit) -> std::result::Result<(), MessageDeliveryError>;
}

pub trait MessageDelivererFactory: Send + Sync {
    fn create(&self, settings: &HashMap<String, String>) -> Result<Arc<dyn MessageDeliverer>>;
}

impl<F> MessageDelivererFactory for F
where
    F: Fn(&HashMap<String, String>) -> Result<Arc<dyn MessageDeliverer>> + Send + Sync,
{
    fn create(&self, settings: &HashMap<String, String>) -> Result<Arc<dyn MessageDeliverer>> {
        self(settings)
    }
}

/// Deliverer factories by name, plus the deliverers created from them.
///
/// Deliverers are shared between all legs with an identical delivery
/// specification.
pub struct DeliveryRegistry {
    factories: HashMap<String, Arc<dyn MessageDelivererFactory>>,
    deliverers: RwLock<HashMap<String, Arc<dyn MessageDeliverer>>>,
}

impl DeliveryRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            deliverers: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the `file` deliverer
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("file", Arc::new(file::FileDelivererFactory));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: Arc<dyn MessageDelivererFactory>) {
        let name = name.into();
        if self.factories.insert(name.clone(), factory).is_some() {
            warn!(factory = %name, "Replaced deliverer factory");
        }
    }

    /// The deliverer for a delivery specification, created on first use
    pub fn deliverer_for(&self, spec: &DeliverySpec) -> Result<Arc<dyn MessageDeliverer>> {
        let key = cache_key(spec);
        if let Some(deliverer) = self
            .deliverers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            return Ok(deliverer.clone());
        }

        let factory = self.factories.get(&spec.factory.factory).ok_or_else(|| {
            MshError::Configuration(format!("Unknown deliverer factory: {}", spec.factory.factory))
        })?;
        let deliverer = factory.create(&spec.factory.settings)?;
        debug!(factory = %spec.factory.factory, "Created message deliverer");
        self.deliverers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, deliverer.clone());
        Ok(deliverer)
    }

    /// Create the deliverers of all legs of a P-Mode so misconfiguration
    /// surfaces when the P-Mode is loaded
    pub fn configure_pmode(&self, pmode: &PMode) -> Result<()> {
        for spec in pmode.legs.iter().filter_map(|l| l.delivery.as_ref()) {
            self.deliverer_for(spec)?;
        }
        Ok(())
    }
}

impl Default for DeliveryRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

fn cache_key(spec: &DeliverySpec) -> String {
    if let Some(id) = &spec.id {
        return id.clone();
    }
    let settings: BTreeMap<_, _> = spec.factory.settings.iter().collect();
    format!("{}{:?}", spec.factory.factory, settings)
}
