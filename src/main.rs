use anyhow::Context;
use dotenv::dotenv;
use std::sync::Arc;
use tracing::info;

use as4_msh::config::MshConfig;
use as4_msh::core::logging::init_logging;
use as4_msh::core::pmode::PModeSet;
use as4_msh::core::processing::InboundProcessor;
use as4_msh::core::transport::{As4TransportService, TransportDispatcher};
use as4_msh::core::workers::WorkerPool;
use as4_msh::presentation::{create_router, AppState};
use as4_msh::storage::StoreFactory;
use as4_msh::MshContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = MshConfig::from_env().context("Invalid configuration")?;
    init_logging(&config.logging)?;

    let provider = StoreFactory::create_provider(&config.store)
        .await
        .context("Cannot create storage provider")?;

    let pmodes = Arc::new(PModeSet::new());
    if let Some(dir) = &config.pmode_dir {
        let loaded = pmodes
            .load_dir(dir)
            .await
            .with_context(|| format!("Cannot load P-Modes from {}", dir.display()))?;
        info!(dir = %dir.display(), loaded, "Loaded P-Modes");
    }

    let msh = MshContext::builder()
        .storage_provider(provider)
        .pmodes(pmodes)
        .global_handlers(config.load_event_handlers().await?)
        .payload_dir(config.payload_dir.clone())
        .message_id_domain(config.message_id_domain.clone())
        .build()?;

    let inbound = Arc::new(InboundProcessor::new(msh.clone()));
    let dispatcher = Arc::new(TransportDispatcher::new());
    dispatcher.register(Arc::new(As4TransportService::new(
        msh.clone(),
        inbound.clone(),
        config.http_timeout,
    )?));

    let workers = WorkerPool::start(msh.clone(), dispatcher, &config.load_workers().await?);

    let app = create_router(AppState::new(msh, inbound));
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Cannot bind {}", config.bind_address))?;
    info!(address = %config.bind_address, "AS4 MSH listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    workers.shutdown().await;
    Ok(())
}
