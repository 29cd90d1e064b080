//! MongoDB storage provider
//!
//! One document per message unit. The searchable attributes (state, direction,
//! type, ids and times) are stored as top level fields next to the full unit so
//! queries can be answered by indexes. The `version` field implements the
//! optimistic concurrency check: updates replace the document only when both
//! `_id` and `version` match.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, Document},
    error::{ErrorKind, WriteFailure},
    options::{ClientOptions, FindOptions, IndexOptions},
    Client, Collection, IndexModel,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::entities::{CoreId, MessageUnit, MessageUnitEntity};
use crate::storage::{MessageUnitQuery, MongoConfig, StorageError, StorageProvider, StoreResult};

const DUPLICATE_KEY_CODE: i32 = 11000;

/// MongoDB document representation of a message unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageUnitDocument {
    #[serde(rename = "_id")]
    pub core_id: String,
    pub version: i64,
    pub last_changed_ms: i64,

    // Query fields
    pub message_id: Option<String>,
    pub direction: String,
    pub unit_type: String,
    pub pmode_id: Option<String>,
    pub current_state: Option<String>,
    pub current_state_since_ms: Option<i64>,
    pub timestamp_ms: Option<i64>,

    pub unit: Document,
}

impl MessageUnitDocument {
    fn from_entity(entity: &MessageUnitEntity) -> StoreResult<Self> {
        let unit = &entity.unit;
        Ok(Self {
            core_id: unit.core_id().to_string(),
            version: entity.version as i64,
            last_changed_ms: entity.last_changed.timestamp_millis(),
            message_id: unit.message_id.clone(),
            direction: unit.direction.to_string(),
            unit_type: unit.unit_type().as_str().to_string(),
            pmode_id: unit.pmode_id.clone(),
            current_state: unit.current_state().map(|s| s.as_str().to_string()),
            current_state_since_ms: unit.current_state_since().map(|t| t.timestamp_millis()),
            timestamp_ms: unit.timestamp.map(|t| t.timestamp_millis()),
            unit: bson::to_document(unit)?,
        })
    }

    fn into_entity(self) -> StoreResult<MessageUnitEntity> {
        let unit: MessageUnit = bson::from_document(self.unit)?;
        Ok(MessageUnitEntity {
            unit,
            version: self.version.max(0) as u64,
            last_changed: from_millis(self.last_changed_ms),
        })
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

fn query_filter(query: &MessageUnitQuery) -> Document {
    let mut filter = Document::new();
    if let Some(types) = &query.unit_types {
        let names: Vec<String> = types.iter().map(|t| t.as_str().to_string()).collect();
        filter.insert("unit_type", doc! { "$in": names });
    }
    if let Some(direction) = query.direction {
        filter.insert("direction", direction.to_string());
    }
    if let Some(states) = &query.states {
        let names: Vec<String> = states.iter().map(|s| s.as_str().to_string()).collect();
        filter.insert("current_state", doc! { "$in": names });
    }
    if let Some(ids) = &query.pmode_ids {
        filter.insert("pmode_id", doc! { "$in": ids.clone() });
    }
    if let Some(message_id) = &query.message_id {
        filter.insert("message_id", message_id.clone());
    }
    if let Some(cutoff) = query.state_changed_before {
        filter.insert(
            "current_state_since_ms",
            doc! { "$lt": cutoff.timestamp_millis() },
        );
    }
    filter
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY_CODE
    )
}

pub struct MongoStorageProvider {
    collection: Collection<MessageUnitDocument>,
}

impl MongoStorageProvider {
    pub async fn connect(config: &MongoConfig, enforce_unique_message_ids: bool) -> StoreResult<Self> {
        let mut options = ClientOptions::parse(&config.uri).await?;
        options.app_name = Some("as4-msh".to_string());
        let client = Client::with_options(options)?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await?;
        debug!("Connected to MongoDB");

        let collection = client
            .database(&config.database)
            .collection::<MessageUnitDocument>(&config.collection);

        let provider = Self { collection };
        provider.create_indexes(enforce_unique_message_ids).await?;

        info!(
            database = %config.database,
            collection = %config.collection,
            "MongoDB storage provider ready"
        );
        Ok(provider)
    }

    async fn create_indexes(&self, enforce_unique_message_ids: bool) -> StoreResult<()> {
        let message_id_options = IndexOptions::builder()
            .unique(enforce_unique_message_ids)
            .partial_filter_expression(doc! { "message_id": { "$type": "string" } })
            .build();

        let indexes = vec![
            IndexModel::builder()
                .keys(doc! { "message_id": 1, "direction": 1 })
                .options(message_id_options)
                .build(),
            IndexModel::builder()
                .keys(doc! { "current_state": 1, "direction": 1, "timestamp_ms": 1 })
                .build(),
            IndexModel::builder()
                .keys(doc! { "current_state_since_ms": 1 })
                .build(),
        ];

        self.collection.create_indexes(indexes, None).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for MongoStorageProvider {
    async fn store_message_unit(&self, unit: MessageUnit) -> StoreResult<MessageUnitEntity> {
        let entity = MessageUnitEntity::new(unit, Utc::now());
        let document = MessageUnitDocument::from_entity(&entity)?;

        match self.collection.insert_one(&document, None).await {
            Ok(_) => {
                debug!(core_id = %entity.core_id(), "Inserted message unit document");
                Ok(entity)
            }
            Err(e) if is_duplicate_key(&e) => Err(StorageError::DuplicateMessageId {
                message_id: entity.unit.message_id.clone().unwrap_or_default(),
                direction: entity.unit.direction,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_message_unit(&self, entity: &MessageUnitEntity) -> StoreResult<MessageUnitEntity> {
        let mut updated = entity.clone();
        updated.version = entity.version + 1;
        updated.last_changed = Utc::now();
        let document = MessageUnitDocument::from_entity(&updated)?;

        let filter = doc! {
            "_id": entity.core_id().to_string(),
            "version": entity.version as i64,
        };
        let result = self.collection.replace_one(filter, &document, None).await?;
        if result.matched_count == 1 {
            return Ok(updated);
        }

        let exists = self
            .collection
            .find_one(doc! { "_id": entity.core_id().to_string() }, None)
            .await?
            .is_some();
        if exists {
            Err(StorageError::AlreadyChanged {
                core_id: entity.core_id(),
            })
        } else {
            Err(StorageError::NotFound(entity.core_id()))
        }
    }

    async fn delete_message_unit(&self, core_id: CoreId) -> StoreResult<bool> {
        let result = self
            .collection
            .delete_one(doc! { "_id": core_id.to_string() }, None)
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn get_message_unit(&self, core_id: CoreId) -> StoreResult<Option<MessageUnitEntity>> {
        self.collection
            .find_one(doc! { "_id": core_id.to_string() }, None)
            .await?
            .map(MessageUnitDocument::into_entity)
            .transpose()
    }

    async fn query_message_units(&self, query: &MessageUnitQuery) -> StoreResult<Vec<MessageUnitEntity>> {
        let options = FindOptions::builder()
            .sort(doc! { "timestamp_ms": 1, "last_changed_ms": 1 })
            .build();
        let cursor = self.collection.find(query_filter(query), options).await?;
        let documents: Vec<MessageUnitDocument> = cursor.try_collect().await?;
        documents
            .into_iter()
            .map(MessageUnitDocument::into_entity)
            .collect()
    }

    fn backend_name(&self) -> &'static str {
        "mongodb"
    }
}
