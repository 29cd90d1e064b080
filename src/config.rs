//! Process configuration
//!
//! Process settings come from `MSH_*` environment variables (a `.env` file is
//! loaded by the binary). The P-Mode set, the worker pool and the global event
//! handlers are read from YAML files named by those settings.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::core::logging::LoggingConfig;
use crate::core::workers::WorkerConfig;
use crate::domain::entities::pmode::EventHandlerConfig;
use crate::error::{MshError, Result};
use crate::storage::{MongoConfig, StoreConfig, StoreMode};

#[derive(Debug, Clone)]
pub struct MshConfig {
    pub bind_address: SocketAddr,
    /// Directory with the P-Mode YAML files
    pub pmode_dir: Option<PathBuf>,
    pub workers_file: Option<PathBuf>,
    pub event_handlers_file: Option<PathBuf>,
    pub payload_dir: PathBuf,
    pub message_id_domain: String,
    /// Connect timeout of outgoing AS4 requests
    pub http_timeout: Duration,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

impl MshConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bind_address = var("MSH_BIND_ADDRESS")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| MshError::Configuration(format!("MSH_BIND_ADDRESS: {}", e)))?;

        let http_timeout = match var("MSH_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| MshError::Configuration(format!("MSH_HTTP_TIMEOUT_SECS must be a number, got '{}'", raw)))?,
            None => Duration::from_secs(30),
        };

        let mode = match var("MSH_STORAGE") {
            Some(raw) => raw.parse::<StoreMode>().map_err(MshError::Configuration)?,
            None => StoreMode::Memory,
        };
        let mongodb = (mode == StoreMode::MongoDb).then(|| {
            let defaults = MongoConfig::default();
            MongoConfig {
                uri: var("MSH_MONGODB_URI").unwrap_or(defaults.uri),
                database: var("MSH_MONGODB_DATABASE").unwrap_or(defaults.database),
                collection: var("MSH_MONGODB_COLLECTION").unwrap_or(defaults.collection),
            }
        });
        let enforce_unique_message_ids = var("MSH_UNIQUE_MESSAGE_IDS")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            bind_address,
            pmode_dir: var("MSH_PMODE_DIR").map(PathBuf::from),
            workers_file: var("MSH_WORKERS_FILE").map(PathBuf::from),
            event_handlers_file: var("MSH_EVENT_HANDLERS_FILE").map(PathBuf::from),
            payload_dir: var("MSH_PAYLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/payloads")),
            message_id_domain: var("MSH_MESSAGE_ID_DOMAIN").unwrap_or_else(|| "as4-msh.local".to_string()),
            http_timeout,
            store: StoreConfig {
                mode,
                mongodb,
                enforce_unique_message_ids,
            },
            logging: LoggingConfig {
                level: var("MSH_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
                format: var("MSH_LOG_FORMAT").unwrap_or_else(|| "compact".to_string()),
            },
        })
    }

    /// Worker pool from the configured file, or the default pool
    pub async fn load_workers(&self) -> Result<Vec<WorkerConfig>> {
        match &self.workers_file {
            Some(path) => {
                let workers = WorkerConfig::load(path).await?;
                info!(file = %path.display(), workers = workers.len(), "Loaded worker configuration");
                Ok(workers)
            }
            None => Ok(WorkerConfig::defaults()),
        }
    }

    pub async fn load_event_handlers(&self) -> Result<Vec<EventHandlerConfig>> {
        match &self.event_handlers_file {
            Some(path) => load_event_handlers(path).await,
            None => Ok(Vec::new()),
        }
    }
}

async fn load_event_handlers(path: &Path) -> Result<Vec<EventHandlerConfig>> {
    let text = tokio::fs::read_to_string(path).await?;
    let handlers: Vec<EventHandlerConfig> = serde_yaml::from_str(&text).map_err(|e| {
        MshError::Configuration(format!("Invalid event handler configuration {}: {}", path.display(), e))
    })?;
    info!(file = %path.display(), handlers = handlers.len(), "Loaded global event handlers");
    Ok(handlers)
}
