//! In-memory storage provider
//!
//! Keeps all message units in a map guarded by a single lock, which makes the
//! versioned update trivially atomic. Used for tests and single-node setups
//! that accept losing state on restart.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::entities::{CoreId, MessageUnit, MessageUnitEntity};
use crate::storage::{MessageUnitQuery, StorageError, StorageProvider, StoreResult};

pub struct InMemoryStorageProvider {
    units: RwLock<HashMap<CoreId, MessageUnitEntity>>,
    enforce_unique_message_ids: bool,
}

impl InMemoryStorageProvider {
    pub fn new(enforce_unique_message_ids: bool) -> Self {
        Self {
            units: RwLock::new(HashMap::new()),
            enforce_unique_message_ids,
        }
    }

    pub async fn len(&self) -> usize {
        self.units.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.units.read().await.is_empty()
    }
}

impl Default for InMemoryStorageProvider {
    fn default() -> Self {
        Self::new(false)
    }
}

#[async_trait]
impl StorageProvider for InMemoryStorageProvider {
    async fn store_message_unit(&self, unit: MessageUnit) -> StoreResult<MessageUnitEntity> {
        let mut units = self.units.write().await;

        if self.enforce_unique_message_ids {
            if let Some(message_id) = &unit.message_id {
                let taken = units.values().any(|e| {
                    e.unit.direction == unit.direction && e.unit.message_id.as_ref() == Some(message_id)
                });
                if taken {
                    return Err(StorageError::DuplicateMessageId {
                        message_id: message_id.clone(),
                        direction: unit.direction,
                    });
                }
            }
        }

        let entity = MessageUnitEntity::new(unit, Utc::now());
        debug!(core_id = %entity.core_id(), "Stored message unit in memory");
        units.insert(entity.core_id(), entity.clone());
        Ok(entity)
    }

    async fn update_message_unit(&self, entity: &MessageUnitEntity) -> StoreResult<MessageUnitEntity> {
        let mut units = self.units.write().await;
        let stored = units
            .get_mut(&entity.core_id())
            .ok_or(StorageError::NotFound(entity.core_id()))?;

        if stored.version != entity.version {
            return Err(StorageError::AlreadyChanged {
                core_id: entity.core_id(),
            });
        }

        let mut updated = entity.clone();
        updated.version = entity.version + 1;
        updated.last_changed = Utc::now();
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete_message_unit(&self, core_id: CoreId) -> StoreResult<bool> {
        Ok(self.units.write().await.remove(&core_id).is_some())
    }

    async fn get_message_unit(&self, core_id: CoreId) -> StoreResult<Option<MessageUnitEntity>> {
        Ok(self.units.read().await.get(&core_id).cloned())
    }

    async fn query_message_units(&self, query: &MessageUnitQuery) -> StoreResult<Vec<MessageUnitEntity>> {
        let units = self.units.read().await;
        let mut result: Vec<MessageUnitEntity> =
            units.values().filter(|e| query.matches(e)).cloned().collect();
        result.sort_by_key(|e| (e.unit.timestamp, e.last_changed));
        Ok(result)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
