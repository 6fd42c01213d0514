//! Route handlers, one module per resource.

use std::sync::Arc;

use engine::ExecutionEngine;
use serde_json::Value;

pub mod custom;
pub mod events;
pub mod executions;
pub mod modules;
pub mod templates;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ExecutionEngine>,
}

impl AppState {
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        Self { engine }
    }
}

/// A target is usable when it is a non-blank string or a non-empty record.
pub(crate) fn has_target(target: &Option<Value>) -> bool {
    match target {
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        _ => false,
    }
}
