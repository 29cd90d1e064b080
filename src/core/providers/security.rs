//! Message level security
//!
//! Signing, encryption and their verification are performed by an external
//! security provider. The MSH only decides when to call it and turns the
//! results into events and processing states.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::entities::pmode::SecurityConfig;
use crate::domain::entities::MessageUnit;
use crate::error::{SecurityFailureReason, SecurityProcessingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityOperation {
    Signing,
    Encryption,
    SignatureVerification,
    Decryption,
}

/// Digest of one signed message part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartDigest {
    pub part: String,
    pub algorithm: String,
    pub value: String,
}

/// Outcome of one successful security operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityProcessingResult {
    pub operation: SecurityOperation,
    pub algorithm: String,
    pub certificate: String,
    #[serde(default)]
    pub digests: Vec<PartDigest>,
}

pub type SecurityResult = std::result::Result<Vec<SecurityProcessingResult>, SecurityProcessingError>;

#[async_trait]
pub trait SecurityProvider: Send + Sync {
    /// Sign and/or encrypt an outgoing message unit as configured
    async fn secure_outbound(&self, unit: &MessageUnit, config: &SecurityConfig) -> SecurityResult;

    /// Verify and/or decrypt a received message unit as configured
    async fn verify_inbound(&self, unit: &MessageUnit, config: &SecurityConfig) -> SecurityResult;
}

/// Used when no security provider is installed. Passes messages without
/// security configuration and fails all others.
#[derive(Debug, Default)]
pub struct UnsupportedSecurityProvider;

impl UnsupportedSecurityProvider {
    fn check(config: &SecurityConfig) -> SecurityResult {
        if config.is_empty() {
            return Ok(Vec::new());
        }
        Err(SecurityProcessingError::new(
            SecurityFailureReason::MissingConfiguration,
            "message security is configured but no security provider is installed",
        ))
    }
}

#[async_trait]
impl SecurityProvider for UnsupportedSecurityProvider {
    async fn secure_outbound(&self, _unit: &MessageUnit, config: &SecurityConfig) -> SecurityResult {
        Self::check(config)
    }

    async fn verify_inbound(&self, _unit: &MessageUnit, config: &SecurityConfig) -> SecurityResult {
        Self::check(config)
    }
}
