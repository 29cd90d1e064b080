//! AS4 receiving endpoint

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tracing::{debug, error};

use crate::error::Result;
use crate::presentation::AppState;

/// Process a received AS4 message and return the synchronous response
async fn receive_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let units = state.msh.packager.unpackage(content_type, &body).await?;
    debug!(units = units.len(), "Received AS4 message");

    let responses = state.inbound.process_request(units).await;
    if responses.is_empty() {
        return Ok(StatusCode::OK.into_response());
    }

    let unpacked: Vec<_> = responses.iter().map(|e| e.unit.clone()).collect();
    match state.msh.packager.package(&unpacked).await {
        Ok(packaged) => {
            state.inbound.mark_responses_sent(responses, None).await;
            Ok((
                StatusCode::OK,
                [(CONTENT_TYPE, packaged.content_type)],
                packaged.body,
            )
                .into_response())
        }
        Err(e) => {
            error!(error = %e, "Cannot package response");
            state
                .inbound
                .mark_responses_sent(responses, Some(e.to_string()))
                .await;
            Err(e)
        }
    }
}

pub fn msh_router() -> Router<AppState> {
    Router::new().route("/msh", post(receive_handler))
}
