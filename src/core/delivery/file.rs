//! Delivers User Messages to a directory
//!
//! Each message is written as `<message id>.json` holding the message unit
//! meta-data. Payload content held by the MSH is copied next to it as
//! `<message id>-<payload id>`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::{MessageDeliverer, MessageDelivererFactory};
use crate::domain::entities::MessageUnit;
use crate::error::{MessageDeliveryError, MshError, Result};

pub struct FileDeliverer {
    directory: PathBuf,
}

impl FileDeliverer {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

#[async_trait]
impl MessageDeliverer for FileDeliverer {
    async fn deliver(&self, unit: &MessageUnit) -> std::result::Result<(), MessageDeliveryError> {
        let um = unit
            .as_user_message()
            .ok_or_else(|| MessageDeliveryError::permanent("only User Messages can be delivered"))?;
        let base = file_name(unit.message_id.as_deref().unwrap_or("unidentified"));

        tokio::fs::create_dir_all(&self.directory).await.map_err(|e| {
            MessageDeliveryError::new(format!(
                "Cannot create delivery directory {}: {}",
                self.directory.display(),
                e
            ))
        })?;

        for payload in &um.payloads {
            let Some(location) = &payload.content_location else {
                continue;
            };
            let target = self
                .directory
                .join(format!("{}-{}", base, payload.payload_id));
            tokio::fs::copy(location, &target).await.map_err(|e| {
                MessageDeliveryError::new(format!("Cannot copy payload {}: {}", payload.payload_id, e))
            })?;
        }

        let meta = serde_json::to_vec_pretty(unit)
            .map_err(|e| MessageDeliveryError::permanent(format!("Cannot serialize message: {}", e)))?;
        let target = self.directory.join(format!("{}.json", base));
        tokio::fs::write(&target, meta)
            .await
            .map_err(|e| MessageDeliveryError::new(format!("Cannot write {}: {}", target.display(), e)))?;

        info!(unit = %unit.label(), file = %target.display(), "Delivered message to directory");
        Ok(())
    }
}

pub(super) struct FileDelivererFactory;

impl MessageDelivererFactory for FileDelivererFactory {
    fn create(&self, settings: &HashMap<String, String>) -> Result<Arc<dyn MessageDeliverer>> {
        let directory = settings
            .get("directory")
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| {
                MshError::Configuration("file deliverer needs a directory setting".to_string())
            })?;
        Ok(Arc::new(FileDeliverer::new(directory)))
    }
}

/// Message ids may contain characters that are not valid in file names
fn file_name(message_id: &str) -> String {
    message_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
