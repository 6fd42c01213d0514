use axum::{
    extract::{Path, State},
    Json,
};
use engine::{ResultsReport, StatusReport};
use serde_json::{json, Value};
use uuid::Uuid;

use super::AppState;
use crate::error::ApiError;

pub async fn list(State(state): State<AppState>) -> Json<Vec<StatusReport>> {
    Json(state.engine.list_executions().await)
}

pub async fn status(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<StatusReport>, ApiError> {
    Ok(Json(state.engine.get_execution_status(id).await?))
}

pub async fn results(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ResultsReport>, ApiError> {
    Ok(Json(state.engine.get_execution_results(id).await?))
}

pub async fn cancel(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    if state.engine.cancel_execution(id).await {
        return Ok(Json(json!({ "executionId": id, "cancelled": true })));
    }
    // Distinguish "unknown" from "already finished".
    state.engine.get_execution_status(id).await?;
    Ok(Json(json!({ "executionId": id, "cancelled": false })))
}
