//! `engine` crate — workflow templates, validation, the template catalog and
//! the execution engine with its session store and lifecycle events.

pub mod catalog;
pub mod error;
pub mod events;
pub mod execution;
pub mod executor;
pub mod merge;
pub mod models;
pub mod store;
pub mod templates;
pub mod validate;

pub use catalog::{TemplateCatalog, TemplateOverrides};
pub use error::{EngineError, ValidationError};
pub use events::{
    ChannelSink, EventDispatcher, EventSink, ExecutionEvent, FanoutSink, NoopSink, TracingSink,
};
pub use execution::{
    Execution, ExecutionResult, ExecutionStatus, ExecutionSummary, ResultsReport, StatusReport,
    StepStatus,
};
pub use executor::{EngineConfig, ExecutionEngine};
pub use models::{ConfigOption, Difficulty, OptionKind, StepDefinition, WorkflowDefinition, WorkflowTemplate};
pub use validate::{validate_template, validate_template_document, validate_workflow_document};

#[cfg(test)]
mod executor_tests;
