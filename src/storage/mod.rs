//! Storage providers for message unit metadata

pub mod adapters;
pub mod config;
pub mod error;
pub mod factory;
pub mod traits;
pub mod types;

pub use adapters::*;
pub use config::*;
pub use error::*;
pub use factory::*;
pub use traits::*;
pub use types::*;
