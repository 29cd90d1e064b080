//! Message processing events and their dispatch to configured handlers

pub mod handler;
pub mod processor;

pub use handler::{
    EventHandlerFactory, HandlerFactoryRegistry, LogEventHandler, MessageProcessingEventHandler,
};
pub use processor::{ConfiguredHandler, EventProcessor};
