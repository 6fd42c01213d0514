use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use engine::{validate_template_document, Difficulty, TemplateOverrides, WorkflowTemplate};
use modules::{Record, RunOptions};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::{has_target, AppState};
use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct TemplateQuery {
    pub category: Option<String>,
    pub difficulty: Option<String>,
    /// Comma-separated; a template matches if it has any of them.
    pub tags: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<TemplateQuery>,
) -> Result<Json<Vec<WorkflowTemplate>>, ApiError> {
    let catalog = state.engine.catalog();
    let mut templates = catalog.get_all_templates();

    if let Some(category) = &query.category {
        templates.retain(|t| &t.category == category);
    }
    if let Some(difficulty) = &query.difficulty {
        let difficulty: Difficulty = difficulty.parse().map_err(ApiError::bad_request)?;
        templates.retain(|t| t.difficulty == difficulty);
    }
    if let Some(tags) = &query.tags {
        let tags: Vec<String> = tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .collect();
        templates.retain(|t| t.has_any_tag(&tags));
    }

    Ok(Json(templates.iter().map(|t| t.as_ref().clone()).collect()))
}

pub async fn get(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<WorkflowTemplate>, ApiError> {
    let template = state.engine.catalog().get_template(&id)?;
    Ok(Json(template.as_ref().clone()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowDto {
    pub target: Option<Value>,
    /// Per-step config overrides keyed by step id.
    #[serde(default)]
    pub custom_config: HashMap<String, Record>,
    pub workflow_name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub options: RunOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedDto {
    pub execution_id: Uuid,
    pub workflow_name: String,
    pub status: &'static str,
}

pub async fn create_workflow(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowDto>,
) -> Result<(StatusCode, Json<StartedDto>), ApiError> {
    if !has_target(&payload.target) {
        return Err(ApiError::bad_request("target is required"));
    }
    let target = payload.target.unwrap_or(Value::Null);

    let overrides = TemplateOverrides {
        name: payload.workflow_name,
        description: payload.description,
        step_configs: payload.custom_config,
        ..TemplateOverrides::default()
    };
    let instance = state.engine.catalog().create_workflow_from_template(&id, &overrides)?;
    let workflow_name = instance.name.clone();

    let execution_id = state
        .engine
        .start_workflow(instance.to_workflow(), target, payload.options)
        .await?;
    info!(template_id = %id, execution_id = %execution_id, "workflow created from template");

    Ok((
        StatusCode::ACCEPTED,
        Json(StartedDto {
            execution_id,
            workflow_name,
            status: "running",
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ValidateDto {
    pub template: Value,
}

pub async fn validate(Json(payload): Json<ValidateDto>) -> Result<Json<Value>, ApiError> {
    let template = validate_template_document(&payload.template)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(Json(json!({ "valid": true, "id": template.id, "steps": template.steps.len() })))
}
