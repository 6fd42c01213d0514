//! Workflow execution engine.
//!
//! `ExecutionEngine` is the central orchestrator:
//! 1. Validates the step list and registers a `running` execution.
//! 2. Runs the steps strictly in order, dispatching each through the
//!    `ModuleRegistry` by its capability id.
//! 3. Binds each step's declared inputs from earlier steps' outputs.
//! 4. Records per-step results and errors on the execution and publishes a
//!    lifecycle event for every transition, in transition order.
//! 5. Stops at the first failure unless `continue_on_error` is set, and
//!    moves the finished execution into history.
//!
//! Cancellation is cooperative: it is observed at step boundaries, and a
//! handler already running is allowed to finish.

use std::sync::Arc;

use modules::{ModuleError, ModuleRegistry, Record, RunOptions};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::catalog::TemplateCatalog;
use crate::events::{EventDispatcher, EventSink, ExecutionEvent, NoopSink};
use crate::execution::{
    Execution, ExecutionResult, ExecutionStatus, ExecutionSummary, ResultsReport, StatusReport,
};
use crate::models::{StepDefinition, WorkflowDefinition};
use crate::store::SessionStore;
use crate::validate::validate_steps;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Buffer size of the lifecycle-event broadcast channel. Subscribers
    /// that fall further behind than this miss events.
    pub event_capacity: usize,
    /// Upper bound on concurrently active executions; `None` is unbounded.
    pub max_active_executions: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
            max_active_executions: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionEngine
// ---------------------------------------------------------------------------

/// Runs workflow executions and keeps their bookkeeping.
///
/// One engine serves any number of concurrent executions; each is driven by
/// the task that called [`ExecutionEngine::execute_workflow`] (or by a
/// spawned task for [`ExecutionEngine::start_workflow`]).
pub struct ExecutionEngine {
    registry: Arc<ModuleRegistry>,
    catalog: Arc<TemplateCatalog>,
    store: SessionStore,
    events: Arc<EventDispatcher>,
    config: EngineConfig,
}

impl ExecutionEngine {
    /// Create a new engine.
    pub fn new(registry: Arc<ModuleRegistry>, catalog: Arc<TemplateCatalog>, config: EngineConfig) -> Self {
        let events = Arc::new(EventDispatcher::new(config.event_capacity, Arc::new(NoopSink)));
        Self {
            registry,
            catalog,
            store: SessionStore::new(Arc::clone(&events)),
            events,
            config,
        }
    }

    /// Also deliver every lifecycle event to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Arc::new(EventDispatcher::new(self.config.event_capacity, sink));
        self.store = SessionStore::new(Arc::clone(&self.events));
        self
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Receive lifecycle events of every execution from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Run `workflow` against `target` to completion and return the outcome.
    ///
    /// # Errors
    /// Only errors that prevent the execution from being created:
    /// [`EngineError::Validation`] and [`EngineError::CapacityExceeded`].
    /// Step failures are reported inside the returned [`ExecutionResult`].
    pub async fn execute_workflow(
        &self,
        workflow: &WorkflowDefinition,
        target: Value,
        options: RunOptions,
    ) -> Result<ExecutionResult, EngineError> {
        let execution_id = self.begin(workflow, target, options).await?;
        Ok(self.drive(execution_id, &workflow.steps).await)
    }

    /// Resolve `template_id` in the catalog and run its steps.
    ///
    /// # Errors
    /// [`EngineError::TemplateNotFound`] before anything runs, plus the
    /// errors of [`ExecutionEngine::execute_workflow`].
    pub async fn execute_workflow_from_template(
        &self,
        template_id: &str,
        target: Value,
        options: RunOptions,
    ) -> Result<ExecutionResult, EngineError> {
        let template = self.catalog.get_template(template_id)?;
        self.execute_workflow(&template.to_workflow(), target, options).await
    }

    /// Register the execution and drive it on a background task.
    ///
    /// Returns as soon as the execution is visible to status queries.
    pub async fn start_workflow(
        self: &Arc<Self>,
        workflow: WorkflowDefinition,
        target: Value,
        options: RunOptions,
    ) -> Result<Uuid, EngineError> {
        let execution_id = self.begin(&workflow, target, options).await?;
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.drive(execution_id, &workflow.steps).await;
        });
        Ok(execution_id)
    }

    /// Background variant of [`ExecutionEngine::execute_workflow_from_template`].
    pub async fn start_workflow_from_template(
        self: &Arc<Self>,
        template_id: &str,
        target: Value,
        options: RunOptions,
    ) -> Result<Uuid, EngineError> {
        let template = self.catalog.get_template(template_id)?;
        self.start_workflow(template.to_workflow(), target, options).await
    }

    // -----------------------------------------------------------------------
    // Queries and control
    // -----------------------------------------------------------------------

    /// Current status of an active or finished execution.
    pub async fn get_execution_status(&self, execution_id: Uuid) -> Result<StatusReport, EngineError> {
        self.store
            .get(execution_id)
            .await
            .map(|e| e.status_report())
            .ok_or(EngineError::ExecutionNotFound(execution_id))
    }

    /// Accumulated outputs and per-step errors.
    pub async fn get_execution_results(&self, execution_id: Uuid) -> Result<ResultsReport, EngineError> {
        self.store
            .get(execution_id)
            .await
            .map(|e| e.results_report())
            .ok_or(EngineError::ExecutionNotFound(execution_id))
    }

    /// Full record of an active or finished execution.
    pub async fn get_execution(&self, execution_id: Uuid) -> Result<Arc<Execution>, EngineError> {
        self.store
            .get(execution_id)
            .await
            .ok_or(EngineError::ExecutionNotFound(execution_id))
    }

    /// Status reports of active executions followed by history.
    pub async fn list_executions(&self) -> Vec<StatusReport> {
        let mut reports: Vec<StatusReport> = self
            .store
            .list_active()
            .await
            .iter()
            .map(Execution::status_report)
            .collect();
        reports.extend(self.store.list_history().await.iter().map(|e| e.status_report()));
        reports
    }

    /// Cancel an active execution. Returns whether a cancellation took effect.
    #[instrument(skip(self))]
    pub async fn cancel_execution(&self, execution_id: Uuid) -> bool {
        match self.store.cancel(execution_id).await {
            Some(_) => {
                info!("execution cancelled");
                true
            }
            None => false,
        }
    }

    /// Digest of an execution: duration, step counts, final status.
    pub fn generate_execution_summary(&self, execution: &Execution) -> ExecutionSummary {
        execution.summary()
    }

    // -----------------------------------------------------------------------
    // Internal: lifecycle
    // -----------------------------------------------------------------------

    async fn begin(
        &self,
        workflow: &WorkflowDefinition,
        target: Value,
        options: RunOptions,
    ) -> Result<Uuid, EngineError> {
        validate_steps(&workflow.steps)?;

        let execution = Execution::new(workflow, target, options);
        let execution_id = execution.id;
        self.store
            .insert_active(execution, self.config.max_active_executions, |e| {
                ExecutionEvent::ExecutionStarted {
                    execution_id: e.id,
                    workflow_id: e.workflow_id.clone(),
                    workflow_name: e.workflow_name.clone(),
                    total_steps: e.steps.len(),
                }
            })
            .await?;

        info!(
            execution_id = %execution_id,
            workflow = %workflow.name,
            steps = workflow.steps.len(),
            "execution started"
        );
        Ok(execution_id)
    }

    #[instrument(skip_all, fields(execution_id = %execution_id))]
    async fn drive(&self, execution_id: Uuid, steps: &[StepDefinition]) -> ExecutionResult {
        let options = self
            .store
            .read_active(execution_id, |e| e.options.clone())
            .await
            .unwrap_or_default();

        let mut abort: Option<String> = None;

        for (index, step) in steps.iter().enumerate() {
            // Step boundary: a cancelled execution is no longer active.
            let started = self
                .store
                .transition(execution_id, |e| {
                    e.start_step(index);
                    let event = ExecutionEvent::StepStarted {
                        execution_id,
                        step_index: index,
                        step_id: step.id.clone(),
                        step_name: step.name.clone(),
                    };
                    ((), event)
                })
                .await;
            if started.is_none() {
                return self.observe_cancellation(execution_id).await;
            }
            info!(step = %step.id, index, "step started");

            let Some(inputs) = self
                .store
                .read_active(execution_id, |e| e.prepare_step_inputs(index))
                .await
            else {
                return self.observe_cancellation(execution_id).await;
            };

            match self.run_step(step, &inputs, &options).await {
                Ok(outputs) => {
                    let completed = self
                        .store
                        .transition(execution_id, move |e| {
                            let progress = e.complete_step(index, outputs.clone());
                            let event = ExecutionEvent::StepCompleted {
                                execution_id,
                                step_index: index,
                                step_id: step.id.clone(),
                                progress,
                                outputs,
                            };
                            (progress, event)
                        })
                        .await;
                    let Some(progress) = completed else {
                        return self.observe_cancellation(execution_id).await;
                    };
                    info!(step = %step.id, progress, "step completed");
                }
                Err(err) => {
                    let message = err.to_string();
                    let failed = self
                        .store
                        .transition(execution_id, |e| {
                            e.fail_step(index, message.clone());
                            let event = ExecutionEvent::StepFailed {
                                execution_id,
                                step_index: index,
                                step_id: step.id.clone(),
                                error: message.clone(),
                            };
                            ((), event)
                        })
                        .await;
                    if failed.is_none() {
                        return self.observe_cancellation(execution_id).await;
                    }
                    warn!(step = %step.id, error = %message, "step failed");

                    if !options.continue_on_error {
                        abort = Some(format!("step '{}' failed: {message}", step.id));
                        break;
                    }
                }
            }
        }

        self.conclude(execution_id, abort).await
    }

    /// Resolve and invoke the handler for one step.
    async fn run_step(
        &self,
        step: &StepDefinition,
        inputs: &Record,
        options: &RunOptions,
    ) -> Result<Record, ModuleError> {
        let handler = self.registry.resolve(&step.module_id)?;
        let config = step.effective_config();
        handler.execute(inputs, &config, options).await
    }

    async fn conclude(&self, execution_id: Uuid, abort: Option<String>) -> ExecutionResult {
        let (status, error) = match abort {
            Some(message) => (ExecutionStatus::Failed, Some(message)),
            None => {
                let failed = self
                    .store
                    .read_active(execution_id, |e| e.summary().failed_step_ids)
                    .await
                    .unwrap_or_default();
                // Tolerated failures still finish the run, but are reported.
                let error = (!failed.is_empty())
                    .then(|| format!("{} step(s) failed: {}", failed.len(), failed.join(", ")));
                (ExecutionStatus::Completed, error)
            }
        };

        let finished = self
            .store
            .finalize(execution_id, status, error, |e| match e.status {
                ExecutionStatus::Failed => ExecutionEvent::ExecutionFailed {
                    execution_id,
                    error: e.error.clone().unwrap_or_default(),
                },
                _ => ExecutionEvent::ExecutionCompleted {
                    execution_id,
                    success: ExecutionResult::from_execution(e).success,
                    summary: e.summary(),
                },
            })
            .await;
        let Some(execution) = finished else {
            return self.observe_cancellation(execution_id).await;
        };

        let result = ExecutionResult::from_execution(&execution);
        match execution.status {
            ExecutionStatus::Failed => {
                error!(error = %execution.error.as_deref().unwrap_or_default(), "execution failed");
            }
            _ => info!(success = result.success, "execution completed"),
        }
        result
    }

    /// The execution left the active table under us: it was cancelled.
    async fn observe_cancellation(&self, execution_id: Uuid) -> ExecutionResult {
        info!("cancellation observed, stopping");
        match self.store.get(execution_id).await {
            Some(execution) => ExecutionResult::from_execution(&execution),
            // Unreachable while history is append-only; report a bare failure.
            None => ExecutionResult {
                success: false,
                execution_id,
                status: ExecutionStatus::Cancelled,
                results: Record::new(),
                summary: None,
                error: Some("execution record disappeared".into()),
            },
        }
    }
}
