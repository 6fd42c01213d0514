//! Module-level error type.

use thiserror::Error;

/// Errors surfaced by module resolution and by a handler's `execute` method.
///
/// The engine records every variant on the failing step; none of them are
/// retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModuleError {
    /// No handler is registered for the capability id.
    #[error("no module registered for capability '{0}'")]
    NotFound(String),

    /// The handler ran and reported a failure.
    #[error("module execution failed: {0}")]
    Failed(String),

    /// An input the handler cannot work without was absent or malformed.
    #[error("invalid module input: {0}")]
    InvalidInput(String),

    /// The step configuration was rejected by the handler.
    #[error("invalid module config: {0}")]
    InvalidConfig(String),
}
