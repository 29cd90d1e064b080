//! Message processing core of the MSH
//!
//! Leaf services (clock, persistence, P-Modes, events, validation, delivery,
//! providers) are wired together by [`context::MshContext`]; processing,
//! transport and the workers build on top of it.

pub mod clock;
pub mod compression;
pub mod context;
pub mod delivery;
pub mod events;
pub mod logging;
pub mod persistence;
pub mod pmode;
pub mod processing;
pub mod providers;
pub mod transport;
pub mod validation;
pub mod workers;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{MshContext, MshContextBuilder};
