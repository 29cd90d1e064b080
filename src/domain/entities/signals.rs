//! Signal message units: Pull Request, Receipt and Error

use serde::{Deserialize, Serialize};
use std::fmt;

use super::user_message::DEFAULT_MPC;

/// Restricts a Pull Request to matching User Messages (selective pulling)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_to_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agreement_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub mpc: String,
    /// Present for a selective Pull Request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<PullSelection>,
}

impl PullRequest {
    pub fn new(mpc: Option<&str>) -> Self {
        Self {
            mpc: match mpc {
                Some(m) if !m.is_empty() => m.to_string(),
                _ => DEFAULT_MPC.to_string(),
            },
            selection: None,
        }
    }

    pub fn selective(mpc: Option<&str>, selection: PullSelection) -> Self {
        Self {
            selection: Some(selection),
            ..Self::new(mpc)
        }
    }

    pub fn is_selective(&self) -> bool {
        self.selection.is_some()
    }
}

/// Receipt signal; the content is opaque to the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSeverity {
    Warning,
    Failure,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Warning => f.write_str("warning"),
            ErrorSeverity::Failure => f.write_str("failure"),
        }
    }
}

/// A single ebMS error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EbmsError {
    pub error_code: String,
    pub severity: ErrorSeverity,
    pub category: String,
    pub short_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_to_message_in_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl EbmsError {
    fn standard(
        code: &str,
        severity: ErrorSeverity,
        category: &str,
        short_description: &str,
        origin: &str,
    ) -> Self {
        Self {
            error_code: code.to_string(),
            severity,
            category: category.to_string(),
            short_description: short_description.to_string(),
            description: None,
            ref_to_message_in_error: None,
            origin: Some(origin.to_string()),
        }
    }

    pub fn value_inconsistent() -> Self {
        Self::standard("EBMS:0003", ErrorSeverity::Failure, "Content", "ValueInconsistent", "ebMS")
    }

    pub fn other() -> Self {
        Self::standard("EBMS:0004", ErrorSeverity::Failure, "Content", "Other", "ebMS")
    }

    pub fn empty_mpc() -> Self {
        Self::standard(
            "EBMS:0006",
            ErrorSeverity::Warning,
            "Communication",
            "EmptyMessagePartitionChannel",
            "ebMS",
        )
    }

    pub fn invalid_header() -> Self {
        Self::standard("EBMS:0009", ErrorSeverity::Failure, "Unpackaging", "InvalidHeader", "ebMS")
    }

    pub fn failed_authentication() -> Self {
        Self::standard(
            "EBMS:0101",
            ErrorSeverity::Failure,
            "Processing",
            "FailedAuthentication",
            "security",
        )
    }

    pub fn failed_decryption() -> Self {
        Self::standard(
            "EBMS:0102",
            ErrorSeverity::Failure,
            "Processing",
            "FailedDecryption",
            "security",
        )
    }

    pub fn delivery_failure() -> Self {
        Self::standard(
            "EBMS:0202",
            ErrorSeverity::Failure,
            "Communication",
            "DeliveryFailure",
            "reliability",
        )
    }

    pub fn missing_receipt() -> Self {
        Self::standard("EBMS:0301", ErrorSeverity::Failure, "Communication", "MissingReceipt", "ebMS")
    }

    pub fn decompression_failure() -> Self {
        Self::standard(
            "EBMS:0303",
            ErrorSeverity::Failure,
            "Communication",
            "DecompressionFailure",
            "ebMS",
        )
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn referencing(mut self, message_id: Option<&str>) -> Self {
        self.ref_to_message_in_error = message_id.map(str::to_string);
        self
    }
}

impl fmt::Display for EbmsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.error_code, self.short_description, self.severity)
    }
}

/// Error signal, carrying one or more ebMS errors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub errors: Vec<EbmsError>,
}

impl ErrorMessage {
    pub fn new(errors: Vec<EbmsError>) -> Self {
        Self { errors }
    }

    /// Highest severity of the contained errors
    pub fn severity(&self) -> Option<ErrorSeverity> {
        self.errors.iter().map(|e| e.severity).max()
    }

    /// Whether every error leaves the referenced message unidentified
    pub fn refers_to_no_message(&self) -> bool {
        self.errors.iter().all(|e| e.ref_to_message_in_error.is_none())
    }
}
