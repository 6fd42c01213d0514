//! Template catalog: named, versioned workflow templates.
//!
//! The catalog is filled at startup and read-only afterwards. Lookups and
//! filters hand out shared references; instantiation always builds a new
//! record and never touches the stored template.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use modules::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::merge::merge_config;
use crate::models::{Difficulty, WorkflowTemplate};
use crate::templates::builtin_templates;
use crate::validate::{validate_template, validate_template_document};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// Caller-supplied changes applied by [`TemplateCatalog::create_workflow_from_template`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateOverrides {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub tags: Option<BTreeSet<String>>,
    #[serde(default)]
    pub estimated_duration: Option<String>,
    /// Per-step config overrides keyed by step id, shallow-merged over the
    /// step's own config.
    #[serde(default)]
    pub step_configs: HashMap<String, Record>,
}

impl TemplateOverrides {
    pub fn with_step_config(mut self, step_id: impl Into<String>, config: Record) -> Self {
        self.step_configs.insert(step_id.into(), config);
        self
    }
}

// ---------------------------------------------------------------------------
// TemplateCatalog
// ---------------------------------------------------------------------------

/// In-memory store of workflow templates keyed by id.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: BTreeMap<String, Arc<WorkflowTemplate>>,
}

impl TemplateCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog seeded with the built-in reconnaissance templates.
    pub fn with_builtin_templates() -> Result<Self, EngineError> {
        let mut catalog = Self::new();
        for template in builtin_templates() {
            catalog.register(template)?;
        }
        Ok(catalog)
    }

    /// Validate and add a template.
    ///
    /// # Errors
    /// [`EngineError::Validation`] for a malformed template,
    /// [`EngineError::DuplicateTemplate`] if the id is taken.
    pub fn register(&mut self, template: WorkflowTemplate) -> Result<(), EngineError> {
        validate_template(&template)?;
        if self.templates.contains_key(&template.id) {
            return Err(EngineError::DuplicateTemplate(template.id));
        }
        info!(template_id = %template.id, steps = template.steps.len(), "registered template");
        self.templates.insert(template.id.clone(), Arc::new(template));
        Ok(())
    }

    /// Validate a raw JSON document and register it.
    pub fn register_document(&mut self, raw: &Value) -> Result<Arc<WorkflowTemplate>, EngineError> {
        let template = validate_template_document(raw)?;
        let id = template.id.clone();
        self.register(template)?;
        self.get_template(&id)
    }

    /// Exact lookup.
    pub fn get_template(&self, id: &str) -> Result<Arc<WorkflowTemplate>, EngineError> {
        self.templates
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::TemplateNotFound(id.to_owned()))
    }

    pub fn get_all_templates(&self) -> Vec<Arc<WorkflowTemplate>> {
        self.templates.values().cloned().collect()
    }

    pub fn get_templates_by_category(&self, category: &str) -> Vec<Arc<WorkflowTemplate>> {
        self.filter(|t| t.category == category)
    }

    pub fn get_templates_by_difficulty(&self, difficulty: Difficulty) -> Vec<Arc<WorkflowTemplate>> {
        self.filter(|t| t.difficulty == difficulty)
    }

    /// Templates carrying at least one of `tags`.
    pub fn search_by_tags(&self, tags: &[String]) -> Vec<Arc<WorkflowTemplate>> {
        self.filter(|t| t.has_any_tag(tags))
    }

    /// Distinct categories, sorted.
    pub fn categories(&self) -> Vec<String> {
        self.templates
            .values()
            .map(|t| t.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    fn filter(&self, pred: impl Fn(&WorkflowTemplate) -> bool) -> Vec<Arc<WorkflowTemplate>> {
        self.templates
            .values()
            .filter(|t| pred(&***t))
            .cloned()
            .collect()
    }

    /// Build a new template-shaped record from `id` with `overrides` applied.
    ///
    /// Top-level fields in `overrides` replace the template's; each step's
    /// config is shallow-merged with `overrides.step_configs[step.id]`.
    ///
    /// # Errors
    /// [`EngineError::TemplateNotFound`] if `id` does not resolve.
    pub fn create_workflow_from_template(
        &self,
        id: &str,
        overrides: &TemplateOverrides,
    ) -> Result<WorkflowTemplate, EngineError> {
        let base = self.get_template(id)?;
        let instance = instantiate(&base, overrides);
        debug!(template_id = %id, "instantiated template");
        Ok(instance)
    }
}

/// Pure instantiation: `base` is never modified.
pub fn instantiate(base: &WorkflowTemplate, overrides: &TemplateOverrides) -> WorkflowTemplate {
    let mut instance = base.clone();

    if let Some(name) = &overrides.name {
        instance.name = name.clone();
    }
    if let Some(description) = &overrides.description {
        instance.description = description.clone();
    }
    if let Some(category) = &overrides.category {
        instance.category = category.clone();
    }
    if let Some(difficulty) = overrides.difficulty {
        instance.difficulty = difficulty;
    }
    if let Some(tags) = &overrides.tags {
        instance.tags = tags.clone();
    }
    if let Some(duration) = &overrides.estimated_duration {
        instance.estimated_duration = Some(duration.clone());
    }

    for step in &mut instance.steps {
        if let Some(step_override) = overrides.step_configs.get(&step.id) {
            step.config = merge_config(&step.config, step_override);
        }
    }

    instance
}
