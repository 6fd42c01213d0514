//! Structural validation — run this before registering a template or
//! executing a custom workflow.
//!
//! Rules enforced:
//! 1. Required top-level fields are present (`id`, `name`, `description`,
//!    `category`, a non-empty `steps`).
//! 2. Every step carries `id`, `name`, `type` and `order`.
//! 3. Step IDs are unique and `order` strictly increases along the list.
//! 4. Configured values respect the options the step declares.
//!
//! Presence is checked on the raw JSON so that every missing field is
//! reported at once instead of stopping at the first serde error.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::ValidationError;
use crate::models::{StepDefinition, WorkflowDefinition, WorkflowTemplate};

const TEMPLATE_FIELDS: &[&str] = &["id", "name", "description", "category"];
const STEP_FIELDS: &[&str] = &["id", "name", "type", "order"];

/// Validate a raw template document and parse it.
///
/// # Errors
/// - [`ValidationError::MissingFields`] listing every absent field.
/// - [`ValidationError::Malformed`] if present fields have the wrong shape.
/// - Any error from [`validate_template`].
pub fn validate_template_document(raw: &Value) -> Result<WorkflowTemplate, ValidationError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| ValidationError::Malformed("template must be a JSON object".into()))?;

    let mut missing: Vec<String> = TEMPLATE_FIELDS
        .iter()
        .filter(|f| !is_present(obj.get(**f)))
        .map(|f| (*f).to_owned())
        .collect();
    missing.extend(missing_step_fields(obj.get("steps")));

    if !missing.is_empty() {
        return Err(ValidationError::MissingFields(missing));
    }

    let template: WorkflowTemplate = serde_json::from_value(raw.clone())
        .map_err(|e| ValidationError::Malformed(e.to_string()))?;
    validate_template(&template)?;
    Ok(template)
}

/// Validate a raw ad-hoc workflow document (`{name?, steps}`) and parse it.
///
/// Only the step list is mandatory for custom workflows.
pub fn validate_workflow_document(raw: &Value) -> Result<WorkflowDefinition, ValidationError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| ValidationError::Malformed("workflow must be a JSON object".into()))?;

    let missing = missing_step_fields(obj.get("steps"));
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields(missing));
    }

    // A template id in a custom document is not a catalog reference.
    let mut workflow: WorkflowDefinition = serde_json::from_value(raw.clone())
        .map_err(|e| ValidationError::Malformed(e.to_string()))?;
    workflow.id = None;
    validate_steps(&workflow.steps)?;
    Ok(workflow)
}

/// Validate an already-typed template.
pub fn validate_template(template: &WorkflowTemplate) -> Result<(), ValidationError> {
    let mut missing = Vec::new();
    for (field, value) in [
        ("id", &template.id),
        ("name", &template.name),
        ("description", &template.description),
        ("category", &template.category),
    ] {
        if value.trim().is_empty() {
            missing.push(field.to_owned());
        }
    }
    if template.steps.is_empty() {
        missing.push("steps".to_owned());
    }
    for (i, step) in template.steps.iter().enumerate() {
        for (field, value) in [("id", &step.id), ("name", &step.name), ("type", &step.step_type)] {
            if value.trim().is_empty() {
                missing.push(format!("steps[{i}].{field}"));
            }
        }
    }
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields(missing));
    }

    validate_steps(&template.steps)
}

/// Step-list rules shared by templates and custom workflows.
pub fn validate_steps(steps: &[StepDefinition]) -> Result<(), ValidationError> {
    if steps.is_empty() {
        return Err(ValidationError::MissingFields(vec!["steps".into()]));
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut previous: Option<u32> = None;

    for step in steps {
        if !seen.insert(step.id.as_str()) {
            return Err(ValidationError::DuplicateStepId(step.id.clone()));
        }

        if let Some(prev) = previous {
            if step.order <= prev {
                return Err(ValidationError::OrderNotIncreasing {
                    step_id: step.id.clone(),
                    order: step.order,
                    previous: prev,
                });
            }
        }
        previous = Some(step.order);

        check_step_config(step)?;
    }

    Ok(())
}

/// Every declared default and every configured value must satisfy its option.
/// Config keys without a declared option are passed through unchecked.
pub fn check_step_config(step: &StepDefinition) -> Result<(), ValidationError> {
    for option in &step.options {
        let configured = step.config.get(&option.name);
        for value in std::iter::once(&option.default).chain(configured) {
            option.check(value).map_err(|reason| ValidationError::InvalidConfig {
                step_id: step.id.clone(),
                option: option.name.clone(),
                reason,
            })?;
        }
    }
    Ok(())
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

fn missing_step_fields(steps: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(steps)) = steps else {
        return vec!["steps".into()];
    };
    if steps.is_empty() {
        return vec!["steps".into()];
    }

    let mut missing = Vec::new();
    for (i, step) in steps.iter().enumerate() {
        for field in STEP_FIELDS {
            if !is_present(step.get(*field)) {
                missing.push(format!("steps[{i}].{field}"));
            }
        }
    }
    missing
}
