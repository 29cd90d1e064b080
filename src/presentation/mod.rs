//! HTTP surface of the MSH

pub mod routes;

use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::core::context::MshContext;
use crate::core::processing::{InboundProcessor, MessageSubmitter};

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub msh: Arc<MshContext>,
    pub inbound: Arc<InboundProcessor>,
    pub submitter: Arc<MessageSubmitter>,
}

impl AppState {
    pub fn new(msh: Arc<MshContext>, inbound: Arc<InboundProcessor>) -> Self {
        Self {
            submitter: Arc::new(MessageSubmitter::new(msh.clone())),
            msh,
            inbound,
        }
    }
}

/// Router with the AS4 endpoint, the message API and the health check
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::health_router())
        .merge(routes::msh::msh_router())
        .nest("/api/messages", routes::messages::messages_router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
