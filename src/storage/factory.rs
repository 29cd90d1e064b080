use std::sync::Arc;
use tracing::info;

use crate::storage::{
    InMemoryStorageProvider, MongoStorageProvider, StorageError, StorageProvider, StoreConfig,
    StoreMode, StoreResult,
};

/// Factory for creating storage providers based on configuration
pub struct StoreFactory;

impl StoreFactory {
    /// Create a storage provider based on the configuration
    pub async fn create_provider(config: &StoreConfig) -> StoreResult<Arc<dyn StorageProvider>> {
        match config.mode {
            StoreMode::Memory => {
                info!("Creating in-memory storage provider");
                Ok(Arc::new(InMemoryStorageProvider::new(
                    config.enforce_unique_message_ids,
                )))
            }
            StoreMode::MongoDb => {
                let mongo_config = config.mongodb.as_ref().ok_or_else(|| {
                    StorageError::Configuration("MongoDB configuration missing".to_string())
                })?;

                info!(database = %mongo_config.database, "Creating MongoDB storage provider");
                let provider =
                    MongoStorageProvider::connect(mongo_config, config.enforce_unique_message_ids)
                        .await?;
                Ok(Arc::new(provider))
            }
        }
    }
}
