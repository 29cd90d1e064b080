use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::error::{MshError, Result};

const DEFAULT_DIRECTIVES: &str = "warn,as4_msh=info,tower_http=info";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// `compact`, `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Filter directives for the configured level. `RUST_LOG` takes precedence.
fn filter_for(level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    match level.to_lowercase().as_str() {
        level @ ("trace" | "debug" | "warn" | "error") => {
            EnvFilter::new(format!("warn,as4_msh={},tower_http={}", level, level))
        }
        _ => EnvFilter::new(DEFAULT_DIRECTIVES),
    }
}

/// Initialize the structured logging system
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let fmt_layer = match config.format.as_str() {
        "json" => fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(fmt::time::ChronoUtc::rfc_3339())
            .json()
            .boxed(),
        "pretty" => fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::NONE)
            .with_timer(fmt::time::ChronoUtc::rfc_3339())
            .pretty()
            .boxed(),
        _ => fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_span_events(FmtSpan::NONE)
            .with_timer(fmt::time::ChronoUtc::rfc_3339())
            .compact()
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter_for(&config.level))
        .with(fmt_layer)
        .try_init()
        .map_err(|e| MshError::Configuration(format!("Cannot initialize logging: {}", e)))?;

    info!(level = %config.level, format = %config.format, "Structured logging initialized");
    Ok(())
}
