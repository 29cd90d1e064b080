pub mod health;
pub mod messages;
pub mod msh;

pub use health::health_router;
pub use messages::messages_router;
pub use msh::msh_router;
