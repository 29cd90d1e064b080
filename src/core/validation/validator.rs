//! Custom validators and their registry

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::domain::entities::{MessageValidationError, UserMessage, ValidationSeverity};
use crate::error::{MshError, Result};

/// Checks a User Message against business rules.
///
/// An `Err` means the validator itself could not run, not that the message is
/// invalid. Problems with the message are reported in the returned list.
#[async_trait]
pub trait MessageValidator: Send + Sync {
    async fn validate(&self, um: &UserMessage) -> Result<Vec<MessageValidationError>>;
}

pub trait ValidatorFactory: Send + Sync {
    fn create(&self, settings: &HashMap<String, String>) -> Result<Arc<dyn MessageValidator>>;
}

impl<F> ValidatorFactory for F
where
    F: Fn(&HashMap<String, String>) -> Result<Arc<dyn MessageValidator>> + Send + Sync,
{
    fn create(&self, settings: &HashMap<String, String>) -> Result<Arc<dyn MessageValidator>> {
        self(settings)
    }
}

pub struct ValidatorRegistry {
    factories: HashMap<String, Arc<dyn ValidatorFactory>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the `required-properties` and `payload-count` validators
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("required-properties", Arc::new(RequiredPropertiesFactory));
        registry.register("payload-count", Arc::new(PayloadCountFactory));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: Arc<dyn ValidatorFactory>) {
        let name = name.into();
        if self.factories.insert(name.clone(), factory).is_some() {
            warn!(factory = %name, "Replaced validator factory");
        }
    }

    pub fn create(
        &self,
        name: &str,
        settings: &HashMap<String, String>,
    ) -> Result<Arc<dyn MessageValidator>> {
        self.factories
            .get(name)
            .ok_or_else(|| MshError::Configuration(format!("Unknown validator factory: {}", name)))?
            .create(settings)
    }
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

fn severity_setting(settings: &HashMap<String, String>) -> Result<ValidationSeverity> {
    match settings.get("severity").map(|s| s.to_uppercase()).as_deref() {
        None | Some("FAILURE") => Ok(ValidationSeverity::Failure),
        Some("WARNING") | Some("WARN") => Ok(ValidationSeverity::Warning),
        Some("INFO") => Ok(ValidationSeverity::Info),
        Some(other) => Err(MshError::Configuration(format!(
            "Invalid validation severity: {}",
            other
        ))),
    }
}

/// Requires the message properties listed (comma separated) in `properties`
pub struct RequiredPropertiesValidator {
    properties: Vec<String>,
    severity: ValidationSeverity,
}

#[async_trait]
impl MessageValidator for RequiredPropertiesValidator {
    async fn validate(&self, um: &UserMessage) -> Result<Vec<MessageValidationError>> {
        Ok(self
            .properties
            .iter()
            .filter(|name| um.property(name).map_or(true, str::is_empty))
            .map(|name| {
                MessageValidationError::new(
                    self.severity,
                    format!("Missing message property {}", name),
                )
            })
            .collect())
    }
}

struct RequiredPropertiesFactory;

impl ValidatorFactory for RequiredPropertiesFactory {
    fn create(&self, settings: &HashMap<String, String>) -> Result<Arc<dyn MessageValidator>> {
        let properties: Vec<String> = settings
            .get("properties")
            .map(|p| {
                p.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        if properties.is_empty() {
            return Err(MshError::Configuration(
                "required-properties validator needs a properties setting".to_string(),
            ));
        }
        Ok(Arc::new(RequiredPropertiesValidator {
            properties,
            severity: severity_setting(settings)?,
        }))
    }
}

/// Bounds the number of payloads with the `min` and `max` settings
pub struct PayloadCountValidator {
    min: usize,
    max: Option<usize>,
    severity: ValidationSeverity,
}

#[async_trait]
impl MessageValidator for PayloadCountValidator {
    async fn validate(&self, um: &UserMessage) -> Result<Vec<MessageValidationError>> {
        let count = um.payloads.len();
        let mut errors = Vec::new();
        if count < self.min {
            errors.push(MessageValidationError::new(
                self.severity,
                format!("Message has {} payloads, at least {} required", count, self.min),
            ));
        }
        if let Some(max) = self.max.filter(|max| count > *max) {
            errors.push(MessageValidationError::new(
                self.severity,
                format!("Message has {} payloads, at most {} allowed", count, max),
            ));
        }
        Ok(errors)
    }
}

struct PayloadCountFactory;

impl ValidatorFactory for PayloadCountFactory {
    fn create(&self, settings: &HashMap<String, String>) -> Result<Arc<dyn MessageValidator>> {
        let parse = |key: &str| -> Result<Option<usize>> {
            settings
                .get(key)
                .map(|v| {
                    v.trim().parse::<usize>().map_err(|_| {
                        MshError::Configuration(format!("Invalid {} for payload-count: {}", key, v))
                    })
                })
                .transpose()
        };
        Ok(Arc::new(PayloadCountValidator {
            min: parse("min")?.unwrap_or(0),
            max: parse("max")?,
            severity: severity_setting(settings)?,
        }))
    }
}
