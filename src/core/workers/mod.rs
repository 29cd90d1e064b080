//! Periodic background workers
//!
//! Every configured worker runs as one or more tokio tasks that execute the
//! worker on a fixed interval until the pool is shut down. Workers only
//! coordinate through the conditional state transitions of the storage
//! manager, so running several tasks of the same worker is safe.

pub mod pull;
pub mod purge;
pub mod retransmission;
pub mod sender;

pub use pull::PullWorker;
pub use purge::PurgeWorker;
pub use retransmission::RetransmissionWorker;
pub use sender::SenderWorker;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::context::MshContext;
use crate::core::transport::TransportDispatcher;
use crate::error::{MshError, Result};

#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    /// Execute one cycle
    async fn run(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    Sender,
    Retransmission,
    Purge,
    Pull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub name: String,
    pub kind: WorkerKind,
    /// Wait before the first run
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Number of tasks running this worker
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

fn default_interval_ms() -> u64 {
    5_000
}

fn default_concurrency() -> usize {
    1
}

fn default_active() -> bool {
    true
}

impl WorkerConfig {
    pub fn new(name: impl Into<String>, kind: WorkerKind, interval: Duration) -> Self {
        Self {
            name: name.into(),
            kind,
            delay_ms: 0,
            interval_ms: interval.as_millis() as u64,
            concurrency: 1,
            active: true,
            parameters: HashMap::new(),
        }
    }

    pub fn with_parameter(mut self, name: &str, value: impl Into<String>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    /// Pool used when no worker configuration file is given
    pub fn defaults() -> Vec<WorkerConfig> {
        vec![
            WorkerConfig::new("sender", WorkerKind::Sender, Duration::from_secs(1)),
            WorkerConfig::new("retransmission", WorkerKind::Retransmission, Duration::from_secs(5)),
            WorkerConfig::new("purge", WorkerKind::Purge, Duration::from_secs(3600)),
            WorkerConfig::new("pull", WorkerKind::Pull, Duration::from_secs(10)),
        ]
    }

    /// Read a worker pool from a YAML list of worker configurations
    pub async fn load(path: &Path) -> Result<Vec<WorkerConfig>> {
        let text = tokio::fs::read_to_string(path).await?;
        serde_yaml::from_str(&text).map_err(|e| {
            MshError::Configuration(format!("Invalid worker configuration {}: {}", path.display(), e))
        })
    }
}

/// Parameter value parsed as `T`. Missing values silently and invalid values
/// with a warning fall back to `default`.
pub fn parameter<T>(parameters: &HashMap<String, String>, name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match parameters.get(name) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(parameter = name, value = %raw, default = %default, "Invalid worker parameter, using default");
            default
        }),
    }
}

/// Comma separated list parameter
pub fn list_parameter(parameters: &HashMap<String, String>, name: &str) -> Vec<String> {
    parameters
        .get(name)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerPool {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Create and start the configured workers
    pub fn start(
        msh: Arc<MshContext>,
        dispatcher: Arc<TransportDispatcher>,
        configs: &[WorkerConfig],
    ) -> Self {
        let mut pool = Self::new();
        for config in configs.iter().filter(|c| c.active) {
            let worker: Arc<dyn Worker> = match config.kind {
                WorkerKind::Sender => Arc::new(SenderWorker::new(msh.clone(), dispatcher.clone())),
                WorkerKind::Retransmission => Arc::new(RetransmissionWorker::new(msh.clone())),
                WorkerKind::Purge => Arc::new(PurgeWorker::from_parameters(msh.clone(), &config.parameters)),
                WorkerKind::Pull => Arc::new(PullWorker::from_parameters(msh.clone(), &config.parameters)),
            };
            pool.spawn(worker, config);
        }
        info!(workers = pool.handles.len(), "Worker pool started");
        pool
    }

    pub fn spawn(&mut self, worker: Arc<dyn Worker>, config: &WorkerConfig) {
        let delay = Duration::from_millis(config.delay_ms);
        let period = Duration::from_millis(config.interval_ms.max(1));

        for instance in 0..config.concurrency.max(1) {
            let worker = worker.clone();
            let mut shutdown = self.shutdown.subscribe();
            let name = config.name.clone();

            self.handles.push(tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => return,
                }
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if let Err(e) = worker.run().await {
                                error!(worker = %name, instance, error = %e, "Worker run failed");
                            }
                        }
                        _ = shutdown.changed() => {
                            debug!(worker = %name, instance, "Worker stopped");
                            break;
                        }
                    }
                }
            }));
        }
        debug!(worker = %config.name, concurrency = config.concurrency, interval_ms = config.interval_ms, "Worker scheduled");
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal all workers to stop and wait until they finished their run
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task ended abnormally");
            }
        }
        info!("Worker pool stopped");
    }
}
