//! Custom validation of User Messages
//!
//! Runs the validators configured on the P-Mode leg in order. After each
//! validator that reports errors the highest severity among them is compared
//! with the stop and rejection thresholds; an unset threshold never triggers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use super::validator::{MessageValidator, ValidatorRegistry};
use crate::core::events::EventProcessor;
use crate::core::pmode::{leg_label_for, PModeSet};
use crate::domain::entities::pmode::CustomValidationConfig;
use crate::domain::entities::{
    EventKind, LegLabel, MessageProcessingEvent, MessageUnit, MessageValidationError, PMode,
    ValidationResult, ValidationSeverity,
};
use crate::error::{MshError, Result};

/// Validators of one leg, instantiated from its configuration
#[derive(Clone)]
pub struct ValidatorChain {
    validators: Vec<(String, Arc<dyn MessageValidator>)>,
    stop_severity: Option<ValidationSeverity>,
    rejection_severity: Option<ValidationSeverity>,
}

impl ValidatorChain {
    pub fn new(
        validators: Vec<(String, Arc<dyn MessageValidator>)>,
        stop_severity: Option<ValidationSeverity>,
        rejection_severity: Option<ValidationSeverity>,
    ) -> Self {
        Self {
            validators,
            stop_severity,
            rejection_severity,
        }
    }

    fn from_config(registry: &ValidatorRegistry, config: &CustomValidationConfig) -> Result<Self> {
        let validators = config
            .validators
            .iter()
            .map(|v| Ok((v.id.clone(), registry.create(&v.factory.factory, &v.factory.settings)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(
            validators,
            config.stop_severity,
            config.rejection_severity,
        ))
    }

    /// Run the chain against a User Message
    pub async fn run(&self, unit: &MessageUnit) -> Result<ValidationResult> {
        let um = unit
            .as_user_message()
            .ok_or_else(|| MshError::Validation("only User Messages can be validated".into()))?;

        let mut result = ValidationResult::default();
        let mut stopped = false;
        for (id, validator) in &self.validators {
            let errors = match validator.validate(um).await {
                Ok(errors) => errors,
                Err(e) => {
                    warn!(validator = %id, unit = %unit.label(), error = %e, "Validator failed");
                    vec![MessageValidationError::failure(format!("Validator could not run: {}", e))]
                }
            };
            let Some(highest) = errors.iter().map(|e| e.severity).max() else {
                continue;
            };
            debug!(validator = %id, unit = %unit.label(), errors = errors.len(), "Validation errors found");
            result.validation_errors.insert(id.clone(), errors);

            if self.rejection_severity.map_or(false, |r| highest >= r) {
                result.should_reject = true;
            }
            if self.stop_severity.map_or(false, |s| highest >= s) {
                stopped = true;
                break;
            }
        }
        result.executed_all_validators = !stopped;
        Ok(result)
    }
}

pub struct CustomValidationExecutor {
    registry: Arc<ValidatorRegistry>,
    pmodes: Arc<PModeSet>,
    events: Arc<EventProcessor>,
    chains: RwLock<HashMap<(String, LegLabel), Option<ValidatorChain>>>,
}

impl CustomValidationExecutor {
    pub fn new(
        registry: Arc<ValidatorRegistry>,
        pmodes: Arc<PModeSet>,
        events: Arc<EventProcessor>,
    ) -> Self {
        Self {
            registry,
            pmodes,
            events,
            chains: RwLock::new(HashMap::new()),
        }
    }

    /// Instantiate the validators of all legs of a P-Mode
    pub fn configure_pmode(&self, pmode: &PMode) -> Result<()> {
        let mut resolved = Vec::new();
        for label in [LegLabel::Request, LegLabel::Reply] {
            if let Some(leg) = pmode.leg(label) {
                let chain = leg
                    .custom_validation()
                    .map(|c| ValidatorChain::from_config(&self.registry, c))
                    .transpose()?;
                resolved.push(((pmode.id.clone(), label), chain));
            }
        }
        let mut chains = self.chains.write().unwrap_or_else(|e| e.into_inner());
        chains.retain(|(id, _), _| *id != pmode.id);
        chains.extend(resolved);
        Ok(())
    }

    pub fn configure_all(&self) -> Result<()> {
        for pmode in self.pmodes.all() {
            self.configure_pmode(&pmode)?;
        }
        Ok(())
    }

    /// Validate a User Message against the custom validation of its leg.
    ///
    /// `None` when no custom validation is configured. When errors are found a
    /// `CustomValidationFailed` event is raised.
    pub async fn validate(&self, unit: &MessageUnit) -> Result<Option<ValidationResult>> {
        if !unit.is_user_message() {
            return Ok(None);
        }
        let Some(chain) = self.chain_for(unit)? else {
            return Ok(None);
        };

        let result = chain.run(unit).await?;
        if result.has_errors() {
            let description = result.describe().join("; ");
            self.events
                .raise_event(
                    MessageProcessingEvent::new(
                        unit,
                        EventKind::CustomValidationFailed {
                            result: result.clone(),
                        },
                    )
                    .with_message(description),
                )
                .await;
        }
        Ok(Some(result))
    }

    fn chain_for(&self, unit: &MessageUnit) -> Result<Option<ValidatorChain>> {
        let Some(pmode_id) = unit.pmode_id.as_deref() else {
            return Ok(None);
        };
        let pmode = self
            .pmodes
            .get(pmode_id)
            .ok_or_else(|| MshError::PModeNotFound(pmode_id.to_string()))?;
        let key = (pmode.id.clone(), leg_label_for(unit, &pmode));

        if let Some(chain) = self
            .chains
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            return Ok(chain.clone());
        }

        self.configure_pmode(&pmode)?;
        Ok(self
            .chains
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned()
            .flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{CollaborationInfo, TradingPartner, UserMessage};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Fixed {
        name: &'static str,
        errors: Vec<MessageValidationError>,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl MessageValidator for Fixed {
        async fn validate(&self, _um: &UserMessage) -> Result<Vec<MessageValidationError>> {
            self.calls.lock().unwrap().push(self.name);
            Ok(self.errors.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl MessageValidator for Broken {
        async fn validate(&self, _um: &UserMessage) -> Result<Vec<MessageValidationError>> {
            Err(MshError::Internal("schema missing".into()))
        }
    }

    fn unit() -> MessageUnit {
        MessageUnit::user_message(UserMessage::new(
            TradingPartner::default(),
            TradingPartner::default(),
            CollaborationInfo::default(),
        ))
    }

    fn fixed(
        name: &'static str,
        severity: ValidationSeverity,
        calls: &Arc<Mutex<Vec<&'static str>>>,
    ) -> (String, Arc<dyn MessageValidator>) {
        (
            name.to_string(),
            Arc::new(Fixed {
                name,
                errors: vec![MessageValidationError::new(severity, format!("{} error", name))],
                calls: calls.clone(),
            }),
        )
    }

    #[tokio::test]
    async fn test_stop_threshold_depends_on_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let v1 = fixed("v1", ValidationSeverity::Info, &calls);
        let v2 = fixed("v2", ValidationSeverity::Failure, &calls);

        let chain = ValidatorChain::new(
            vec![v1.clone(), v2.clone()],
            Some(ValidationSeverity::Warning),
            None,
        );
        let result = chain.run(&unit()).await.unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["v1", "v2"]);
        assert!(!result.executed_all_validators);
        assert_eq!(result.validation_errors.len(), 2);

        calls.lock().unwrap().clear();
        let chain = ValidatorChain::new(vec![v2, v1], Some(ValidationSeverity::Warning), None);
        let result = chain.run(&unit()).await.unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["v2"]);
        assert!(!result.executed_all_validators);
        assert!(!result.validation_errors.contains_key("v1"));
    }

    #[tokio::test]
    async fn test_rejection_threshold() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = ValidatorChain::new(
            vec![
                fixed("v1", ValidationSeverity::Warning, &calls),
                fixed("v2", ValidationSeverity::Info, &calls),
            ],
            None,
            Some(ValidationSeverity::Warning),
        );
        let result = chain.run(&unit()).await.unwrap();
        assert!(result.should_reject);
        assert!(result.executed_all_validators);

        let lenient = ValidatorChain::new(
            vec![fixed("v1", ValidationSeverity::Warning, &calls)],
            None,
            Some(ValidationSeverity::Failure),
        );
        assert!(!lenient.run(&unit()).await.unwrap().should_reject);
    }

    #[tokio::test]
    async fn test_broken_validator_counts_as_failure() {
        let chain = ValidatorChain::new(
            vec![("broken".to_string(), Arc::new(Broken) as Arc<dyn MessageValidator>)],
            Some(ValidationSeverity::Failure),
            Some(ValidationSeverity::Failure),
        );
        let result = chain.run(&unit()).await.unwrap();
        assert!(result.should_reject);
        assert!(!result.executed_all_validators);
        assert_eq!(
            result.validation_errors["broken"][0].severity,
            ValidationSeverity::Failure
        );
    }

    #[tokio::test]
    async fn test_clean_run() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let clean = (
            "clean".to_string(),
            Arc::new(Fixed {
                name: "clean",
                errors: Vec::new(),
                calls: calls.clone(),
            }) as Arc<dyn MessageValidator>,
        );
        let chain = ValidatorChain::new(vec![clean], Some(ValidationSeverity::Info), Some(ValidationSeverity::Info));
        let result = chain.run(&unit()).await.unwrap();
        assert!(result.executed_all_validators);
        assert!(!result.should_reject);
        assert!(!result.has_errors());
    }
}
