use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::{json, Value};

use crate::presentation::AppState;

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "storage": state.msh.storage.provider().backend_name(),
        "pmodes": state.msh.pmodes.len(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub fn health_router() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}
