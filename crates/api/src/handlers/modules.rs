use axum::{extract::State, Json};
use modules::builtin;
use serde_json::{json, Value};

use super::AppState;

/// Static module catalog plus the capability ids actually registered.
pub async fn list(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "modules": builtin::catalog(),
        "registered": state.engine.registry().capability_ids(),
    }))
}
