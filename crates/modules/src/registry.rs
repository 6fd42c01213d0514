//! Capability-indexed dispatch table.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{ModuleError, ModuleHandler};

/// Maps a step's capability id (`moduleId`) to its handler.
///
/// Built once at startup and shared read-only afterwards, so no locking is
/// involved in resolution.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    handlers: HashMap<String, Arc<dyn ModuleHandler>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `capability_id`, replacing any previous entry.
    pub fn register(&mut self, capability_id: impl Into<String>, handler: Arc<dyn ModuleHandler>) {
        self.handlers.insert(capability_id.into(), handler);
    }

    /// Builder-style variant of [`ModuleRegistry::register`].
    pub fn with(mut self, capability_id: impl Into<String>, handler: Arc<dyn ModuleHandler>) -> Self {
        self.register(capability_id, handler);
        self
    }

    /// Look up the handler for `capability_id`.
    ///
    /// # Errors
    /// [`ModuleError::NotFound`] when nothing is registered under that id.
    pub fn resolve(&self, capability_id: &str) -> Result<Arc<dyn ModuleHandler>, ModuleError> {
        self.handlers
            .get(capability_id)
            .cloned()
            .ok_or_else(|| ModuleError::NotFound(capability_id.to_owned()))
    }

    pub fn contains(&self, capability_id: &str) -> bool {
        self.handlers.contains_key(capability_id)
    }

    /// Registered capability ids, sorted.
    pub fn capability_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handlers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("capabilities", &self.capability_ids())
            .finish()
    }
}
