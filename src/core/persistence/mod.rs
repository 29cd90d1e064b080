//! Message unit persistence services shared by all workers and handlers

pub mod manager;
pub mod query;

pub use manager::StorageManager;
pub use query::QueryManager;
