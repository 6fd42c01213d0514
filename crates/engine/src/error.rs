//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

/// Structural problems found in a template or workflow before anything runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Required fields are absent, null or empty. Paths look like `steps` or
    /// `steps[1].order`.
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    /// Two steps share the same ID.
    #[error("duplicate step ID: '{0}'")]
    DuplicateStepId(String),

    /// `order` does not strictly increase along the step list.
    #[error("step '{step_id}' has order {order}, which does not follow {previous}")]
    OrderNotIncreasing {
        step_id: String,
        order: u32,
        previous: u32,
    },

    /// A configured value violates its declared option.
    #[error("step '{step_id}' option '{option}': {reason}")]
    InvalidConfig {
        step_id: String,
        option: String,
        reason: String,
    },

    /// The document could not be read as a template at all.
    #[error("malformed definition: {0}")]
    Malformed(String),
}

/// Errors produced by the catalog and the execution engine.
///
/// Step-level failures never show up here: they are captured into the
/// execution record instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested template id has no catalog entry.
    #[error("template not found: '{0}'")]
    TemplateNotFound(String),

    /// A template with this id is already registered.
    #[error("template '{0}' is already registered")]
    DuplicateTemplate(String),

    /// The workflow failed structural validation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// No active or historic execution has this id.
    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    /// The engine already runs as many executions as it is configured for.
    #[error("too many active executions (limit {0})")]
    CapacityExceeded(usize),
}
