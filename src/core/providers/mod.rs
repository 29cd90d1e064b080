//! Interfaces to the security provider and the message packager

pub mod packaging;
pub mod security;

pub use packaging::{JsonPackager, MessagePackager, PackagedMessage, JSON_CONTENT_TYPE};
pub use security::{
    PartDigest, SecurityOperation, SecurityProcessingResult, SecurityProvider, SecurityResult,
    UnsupportedSecurityProvider,
};
