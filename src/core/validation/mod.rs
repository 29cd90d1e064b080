//! Header and custom validation of message units

pub mod executor;
pub mod header;
pub mod validator;

pub use executor::{CustomValidationExecutor, ValidatorChain};
pub use header::validate_header;
pub use validator::{MessageValidator, ValidatorFactory, ValidatorRegistry};
