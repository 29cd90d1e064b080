//! P-Mode set and leg resolution

pub mod resolver;

pub use resolver::{find_for_user_message, leg_for, leg_label_for};

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::domain::entities::PMode;
use crate::error::{MshError, Result};

/// The P-Modes known to this MSH, keyed by id
#[derive(Default)]
pub struct PModeSet {
    pmodes: RwLock<HashMap<String, Arc<PMode>>>,
}

impl PModeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a P-Mode after checking its consistency. An existing P-Mode with the
    /// same id is replaced.
    pub fn add(&self, pmode: PMode) -> Result<()> {
        pmode.check().map_err(MshError::InvalidPMode)?;
        let id = pmode.id.clone();
        let previous = self
            .pmodes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), Arc::new(pmode));
        if previous.is_some() {
            info!(pmode_id = %id, "Replaced P-Mode");
        } else {
            debug!(pmode_id = %id, "Added P-Mode");
        }
        Ok(())
    }

    pub fn remove(&self, id: &str) -> bool {
        self.pmodes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some()
    }

    pub fn get(&self, id: &str) -> Option<Arc<PMode>> {
        self.pmodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn all(&self) -> Vec<Arc<PMode>> {
        let mut all: Vec<_> = self
            .pmodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.pmodes.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load every `*.yaml`/`*.yml` file in `dir` as a P-Mode. A file that
    /// cannot be parsed or fails the consistency check aborts loading.
    pub async fn load_dir(&self, dir: &Path) -> Result<usize> {
        let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
            MshError::Configuration(format!("Cannot read P-Mode directory {}: {}", dir.display(), e))
        })?;

        let mut loaded = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| e == "yaml" || e == "yml");
            if !is_yaml {
                debug!(file = %path.display(), "Skipping non YAML file in P-Mode directory");
                continue;
            }

            let content = tokio::fs::read_to_string(&path).await?;
            let pmode: PMode = serde_yaml::from_str(&content).map_err(|e| {
                MshError::InvalidPMode(format!("{}: {}", path.display(), e))
            })?;
            self.add(pmode)?;
            loaded += 1;
        }

        if loaded == 0 {
            warn!(dir = %dir.display(), "No P-Modes found");
        } else {
            info!(dir = %dir.display(), count = loaded, "Loaded P-Modes");
        }
        Ok(loaded)
    }
}
