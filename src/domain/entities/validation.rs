//! Validation result types shared by header and custom validation

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Severity of a validation error, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationSeverity {
    Info,
    Warning,
    Failure,
}

impl fmt::Display for ValidationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationSeverity::Info => f.write_str("INFO"),
            ValidationSeverity::Warning => f.write_str("WARN"),
            ValidationSeverity::Failure => f.write_str("FAILURE"),
        }
    }
}

/// A problem found by a validator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageValidationError {
    pub severity: ValidationSeverity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl MessageValidationError {
    pub fn new(severity: ValidationSeverity, description: impl Into<String>) -> Self {
        Self {
            severity,
            description: description.into(),
            details: None,
        }
    }

    pub fn failure(description: impl Into<String>) -> Self {
        Self::new(ValidationSeverity::Failure, description)
    }

    pub fn warning(description: impl Into<String>) -> Self {
        Self::new(ValidationSeverity::Warning, description)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for MessageValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.description)
    }
}

/// Outcome of running the custom validators configured for a User Message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// `false` when a stop threshold ended the run early
    pub executed_all_validators: bool,
    pub should_reject: bool,
    /// Errors keyed by the id of the validator that reported them
    pub validation_errors: HashMap<String, Vec<MessageValidationError>>,
}

impl ValidationResult {
    pub fn has_errors(&self) -> bool {
        self.validation_errors.values().any(|errs| !errs.is_empty())
    }

    /// Flattened error descriptions, prefixed with the validator id
    pub fn describe(&self) -> Vec<String> {
        let mut ids: Vec<&String> = self.validation_errors.keys().collect();
        ids.sort();
        ids.into_iter()
            .flat_map(|id| {
                self.validation_errors[id]
                    .iter()
                    .map(move |e| format!("{}: {}", id, e))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(ValidationSeverity::Info < ValidationSeverity::Warning);
        assert!(ValidationSeverity::Warning < ValidationSeverity::Failure);
    }

    #[test]
    fn test_describe_is_sorted_by_validator() {
        let mut result = ValidationResult::default();
        result
            .validation_errors
            .insert("b".into(), vec![MessageValidationError::warning("late")]);
        result
            .validation_errors
            .insert("a".into(), vec![MessageValidationError::failure("early")]);

        assert!(result.has_errors());
        assert_eq!(
            result.describe(),
            vec!["a: [FAILURE] early".to_string(), "b: [WARN] late".to_string()]
        );
    }
}
