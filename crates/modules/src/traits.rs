//! The `ModuleHandler` trait — the contract every step implementation must fulfil.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ModuleError;

/// A record of named values: step inputs, step config and step outputs all
/// share this shape.
pub type Record = Map<String, Value>;

/// Execution-wide options supplied by the caller of a run.
///
/// Defined here (in the modules crate) so both the engine and individual
/// handlers can read it without a circular dependency. Keys the engine does
/// not recognise are kept in `extra` and handed to every handler unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    /// Keep running later steps after a step fails.
    #[serde(default)]
    pub continue_on_error: bool,
    /// Skip intrusive checks in modules that honour it.
    #[serde(default = "default_safe_mode")]
    pub safe_mode: bool,
    /// Any other caller-supplied options.
    #[serde(flatten)]
    pub extra: Record,
}

fn default_safe_mode() -> bool {
    true
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            safe_mode: default_safe_mode(),
            extra: Record::new(),
        }
    }
}

impl RunOptions {
    /// Options with `continue_on_error` switched on.
    pub fn continue_on_error() -> Self {
        Self {
            continue_on_error: true,
            ..Self::default()
        }
    }
}

/// The core module trait.
///
/// A handler only sees the three values it is given and must not reach into
/// engine or session state. Built-in stand-ins and real scanners alike
/// implement this.
#[async_trait]
pub trait ModuleHandler: Send + Sync {
    /// Run the step: `inputs` are assembled by the engine from the target and
    /// earlier step outputs, `config` is the step's effective configuration
    /// and `options` are the run-wide options.
    async fn execute(
        &self,
        inputs: &Record,
        config: &Record,
        options: &RunOptions,
    ) -> Result<Record, ModuleError>;
}
