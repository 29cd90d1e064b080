pub mod memory;
pub mod mongo;

pub use memory::InMemoryStorageProvider;
pub use mongo::MongoStorageProvider;
