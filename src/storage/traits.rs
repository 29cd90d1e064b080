use async_trait::async_trait;

use crate::domain::entities::{CoreId, MessageUnit, MessageUnitEntity};
use crate::storage::{MessageUnitQuery, StoreResult};

/// Persistence backend for message unit metadata.
///
/// Implementations must make `update_message_unit` an atomic compare-and-set
/// on the entity version: the update only succeeds when the stored version
/// still equals `entity.version`, otherwise `StorageError::AlreadyChanged` is
/// returned. All concurrency control of the engine rests on this guarantee.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Persist a new message unit.
    ///
    /// Fails with `DuplicateMessageId` when the provider enforces message id
    /// uniqueness and the id is already used for the unit's direction.
    async fn store_message_unit(&self, unit: MessageUnit) -> StoreResult<MessageUnitEntity>;

    /// Replace the stored unit if its version is unchanged; returns the entity
    /// with the new version and change time
    async fn update_message_unit(&self, entity: &MessageUnitEntity) -> StoreResult<MessageUnitEntity>;

    /// Remove a unit; `false` when it did not exist (anymore)
    async fn delete_message_unit(&self, core_id: CoreId) -> StoreResult<bool>;

    async fn get_message_unit(&self, core_id: CoreId) -> StoreResult<Option<MessageUnitEntity>>;

    /// Units matching the query, ordered by timestamp ascending
    async fn query_message_units(&self, query: &MessageUnitQuery) -> StoreResult<Vec<MessageUnitEntity>>;

    /// Get the backend name/type
    fn backend_name(&self) -> &'static str;
}
