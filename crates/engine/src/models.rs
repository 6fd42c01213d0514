//! Template-side domain models.
//!
//! These types describe what a workflow looks like before it runs. They are
//! shared read-only between executions; per-run state lives in
//! [`crate::execution`]. Wire names are camelCase.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use modules::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::merge::merge_config;

// ---------------------------------------------------------------------------
// Difficulty
// ---------------------------------------------------------------------------

/// How much expertise a template assumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::Intermediate
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Beginner => write!(f, "beginner"),
            Self::Intermediate => write!(f, "intermediate"),
            Self::Advanced => write!(f, "advanced"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner"     => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced"     => Ok(Self::Advanced),
            other          => Err(format!("unknown difficulty: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// ConfigOption
// ---------------------------------------------------------------------------

/// Shape and bounds of one recognised config option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OptionKind {
    Integer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
    Choice {
        choices: Vec<String>,
    },
    Boolean,
    Text,
}

/// A declared step option with its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigOption {
    pub name: String,
    #[serde(flatten)]
    pub kind: OptionKind,
    pub default: Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl ConfigOption {
    pub fn integer(name: impl Into<String>, default: i64, min: Option<i64>, max: Option<i64>) -> Self {
        Self {
            name: name.into(),
            kind: OptionKind::Integer { min, max },
            default: Value::from(default),
            description: String::new(),
        }
    }

    pub fn choice(name: impl Into<String>, default: &str, choices: &[&str]) -> Self {
        Self {
            name: name.into(),
            kind: OptionKind::Choice {
                choices: choices.iter().map(|c| (*c).to_owned()).collect(),
            },
            default: Value::from(default),
            description: String::new(),
        }
    }

    pub fn boolean(name: impl Into<String>, default: bool) -> Self {
        Self {
            name: name.into(),
            kind: OptionKind::Boolean,
            default: Value::from(default),
            description: String::new(),
        }
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Check `value` against the declared kind. Returns the reason on mismatch.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match &self.kind {
            OptionKind::Integer { min, max } => {
                let n = value.as_i64().ok_or_else(|| format!("expected an integer, got {value}"))?;
                if let Some(min) = min {
                    if n < *min {
                        return Err(format!("{n} is below the minimum {min}"));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        return Err(format!("{n} is above the maximum {max}"));
                    }
                }
                Ok(())
            }
            OptionKind::Choice { choices } => match value.as_str() {
                Some(s) if choices.iter().any(|c| c == s) => Ok(()),
                _ => Err(format!("{value} is not one of [{}]", choices.join(", "))),
            },
            OptionKind::Boolean if value.is_boolean() => Ok(()),
            OptionKind::Boolean => Err(format!("expected a boolean, got {value}")),
            OptionKind::Text if value.is_string() => Ok(()),
            OptionKind::Text => Err(format!("expected a string, got {value}")),
        }
    }
}

// ---------------------------------------------------------------------------
// StepDefinition
// ---------------------------------------------------------------------------

/// A single step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// Unique identifier within the workflow.
    pub id: String,
    pub name: String,
    /// Free-form category label; not used for dispatch.
    #[serde(rename = "type")]
    pub step_type: String,
    /// Authoring order. Must increase strictly along `steps`.
    pub order: u32,
    /// Capability id resolved against the module registry.
    #[serde(default)]
    pub module_id: String,
    /// Configured values for this step.
    #[serde(default)]
    pub config: Record,
    /// Recognised options with defaults and bounds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ConfigOption>,
    /// Names this step expects from earlier outputs.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Names this step promises to produce.
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl StepDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        step_type: impl Into<String>,
        order: u32,
        module_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            step_type: step_type.into(),
            order,
            module_id: module_id.into(),
            config: Record::new(),
            options: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_inputs(mut self, inputs: &[&str]) -> Self {
        self.inputs = inputs.iter().map(|s| (*s).to_owned()).collect();
        self
    }

    pub fn with_outputs(mut self, outputs: &[&str]) -> Self {
        self.outputs = outputs.iter().map(|s| (*s).to_owned()).collect();
        self
    }

    pub fn with_option(mut self, option: ConfigOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Declared defaults overlaid by the configured values.
    pub fn effective_config(&self) -> Record {
        let defaults: Record = self
            .options
            .iter()
            .map(|o| (o.name.clone(), o.default.clone()))
            .collect();
        merge_config(&defaults, &self.config)
    }
}

// ---------------------------------------------------------------------------
// WorkflowTemplate
// ---------------------------------------------------------------------------

/// A named, catalogued workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Descriptive only; never enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<String>,
    pub steps: Vec<StepDefinition>,
}

impl WorkflowTemplate {
    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|t| self.tags.contains(t))
    }

    /// The executable part of the template.
    pub fn to_workflow(&self) -> WorkflowDefinition {
        WorkflowDefinition {
            id: Some(self.id.clone()),
            name: self.name.clone(),
            steps: self.steps.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

/// What the engine actually runs: a step list with an optional template origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    /// Originating template id; `None` for ad-hoc step lists.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_workflow_name")]
    pub name: String,
    pub steps: Vec<StepDefinition>,
}

fn default_workflow_name() -> String {
    "Custom Workflow".to_owned()
}

impl WorkflowDefinition {
    /// An anonymous workflow over `steps`.
    pub fn ad_hoc(name: impl Into<String>, steps: Vec<StepDefinition>) -> Self {
        Self { id: None, name: name.into(), steps }
    }
}
