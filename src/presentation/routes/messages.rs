//! Submission and monitoring of message units

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};

use crate::domain::entities::{
    Direction, MessageUnit, MessageUnitEntity, ProcessingState, UserMessage,
};
use crate::error::{MshError, Result};
use crate::presentation::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub pmode_id: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub ref_to_message_id: Option<String>,
    pub user_message: UserMessage,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub message_id: String,
    pub core_id: String,
    pub state: Option<ProcessingState>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub state: Option<ProcessingState>,
    pub direction: Option<Direction>,
}

async fn submit_handler(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>)> {
    let mut unit = MessageUnit::user_message(request.user_message);
    unit.message_id = request.message_id;
    unit.ref_to_message_id = request.ref_to_message_id;

    let entity = state.submitter.submit(unit, &request.pmode_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            message_id: entity.message_id().unwrap_or_default().to_string(),
            core_id: entity.core_id().to_string(),
            state: entity.current_state(),
        }),
    ))
}

async fn list_handler(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<MessageUnitEntity>>> {
    let states: Vec<ProcessingState> = params.state.into_iter().collect();
    let units = state
        .msh
        .query
        .get_message_units_in_state(&[], params.direction, &[], &states)
        .await?;
    Ok(Json(units))
}

async fn get_handler(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Result<Json<Vec<MessageUnitEntity>>> {
    let units = state
        .msh
        .query
        .get_message_units_with_id(&message_id, None)
        .await?;
    if units.is_empty() {
        return Err(MshError::NotFound(format!("message unit {}", message_id)));
    }
    Ok(Json(units))
}

pub fn messages_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_handler).post(submit_handler))
        .route("/:message_id", get(get_handler))
}
