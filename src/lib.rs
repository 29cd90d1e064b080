//! as4-msh - an ebMS3/AS4 Message Service Handler
//!
//! Stores submitted and received message units with their processing state
//! history, pushes and pulls them to and from trading partners, retransmits
//! unacknowledged User Messages and purges old message units.

pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod presentation;
pub mod storage;

pub use crate::core::context::MshContext;
pub use error::{MshError, Result};
