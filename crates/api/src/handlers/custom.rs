use axum::{extract::State, http::StatusCode, Json};
use engine::validate_workflow_document;
use modules::RunOptions;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::templates::StartedDto;
use super::{has_target, AppState};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateCustomDto {
    pub workflow: Option<Value>,
    pub target: Option<Value>,
    #[serde(default)]
    pub options: RunOptions,
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateCustomDto>,
) -> Result<(StatusCode, Json<StartedDto>), ApiError> {
    let raw = payload
        .workflow
        .ok_or_else(|| ApiError::bad_request("workflow is required"))?;
    let workflow = validate_workflow_document(&raw).map_err(|e| ApiError::bad_request(e.to_string()))?;
    if !has_target(&payload.target) {
        return Err(ApiError::bad_request("target is required"));
    }
    let target = payload.target.unwrap_or(Value::Null);

    let workflow_name = workflow.name.clone();
    let execution_id = state.engine.start_workflow(workflow, target, payload.options).await?;
    info!(execution_id = %execution_id, "custom workflow started");

    Ok((
        StatusCode::ACCEPTED,
        Json(StartedDto {
            execution_id,
            workflow_name,
            status: "running",
        }),
    ))
}
