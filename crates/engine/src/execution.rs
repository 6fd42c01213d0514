//! Per-run execution state and the read-only reports derived from it.
//!
//! An [`Execution`] is private to one run: it copies the step definitions it
//! was started with and tracks their runtime state beside them. The engine
//! mutates it in place while it is active; once it reaches history it is
//! never mutated again.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use modules::{Record, RunOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{StepDefinition, WorkflowDefinition};

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running   => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed    => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// `pending → running → completed | failed`. `cancelled` marks a step that
/// was in flight when its execution was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

// ---------------------------------------------------------------------------
// StepRun
// ---------------------------------------------------------------------------

/// A step definition plus its runtime state within one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRun {
    #[serde(flatten)]
    pub definition: StepDefinition,
    pub status: StepStatus,
    /// 0 until the step completes, then 100.
    pub progress: u8,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub results: Option<Record>,
    pub error: Option<String>,
}

impl StepRun {
    fn pending(definition: StepDefinition) -> Self {
        Self {
            definition,
            status: StepStatus::Pending,
            progress: 0,
            start_time: None,
            end_time: None,
            results: None,
            error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// One concrete run of a workflow against a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: Uuid,
    /// `None` for ad-hoc step lists.
    pub workflow_id: Option<String>,
    pub workflow_name: String,
    pub target: Value,
    pub options: RunOptions,
    pub status: ExecutionStatus,
    /// Index of the step executing now, or the last one attempted.
    pub current_step: usize,
    pub steps: Vec<StepRun>,
    /// Outputs of completed steps keyed by step id.
    pub results: Record,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Execution {
    /// A fresh `running` execution with every step `pending`.
    pub fn new(workflow: &WorkflowDefinition, target: Value, options: RunOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id: workflow.id.clone(),
            workflow_name: workflow.name.clone(),
            target,
            options,
            status: ExecutionStatus::Running,
            current_step: 0,
            steps: workflow.steps.iter().cloned().map(StepRun::pending).collect(),
            results: Record::new(),
            start_time: Utc::now(),
            end_time: None,
            error: None,
        }
    }

    pub fn completed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.status == StepStatus::Completed).count()
    }

    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.status == StepStatus::Failed).count()
    }

    /// `round(100 * completed / total)`.
    pub fn progress(&self) -> u8 {
        let total = self.steps.len();
        if total == 0 {
            return 0;
        }
        let pct = (100.0 * self.completed_steps() as f64 / total as f64).round();
        pct as u8
    }

    /// Assemble the input record for step `index`.
    ///
    /// `target` is always present. Each declared input is copied from the
    /// first earlier completed step (in completion order) whose outputs carry
    /// that key; inputs nobody produced are left out.
    pub fn prepare_step_inputs(&self, index: usize) -> Record {
        let mut inputs = Record::new();
        inputs.insert("target".into(), self.target.clone());

        let Some(step) = self.steps.get(index) else {
            return inputs;
        };

        for key in &step.definition.inputs {
            if key == "target" {
                continue;
            }
            let produced = self.steps[..index]
                .iter()
                .filter(|s| s.status == StepStatus::Completed)
                .filter_map(|s| s.results.as_ref())
                .find_map(|outputs| outputs.get(key));
            if let Some(value) = produced {
                inputs.insert(key.clone(), value.clone());
            }
        }
        inputs
    }

    pub(crate) fn start_step(&mut self, index: usize) {
        self.current_step = index;
        if let Some(step) = self.steps.get_mut(index) {
            step.status = StepStatus::Running;
            step.start_time = Some(Utc::now());
        }
    }

    /// Record the outputs of step `index` and return the new progress.
    pub(crate) fn complete_step(&mut self, index: usize, outputs: Record) -> u8 {
        if let Some(step) = self.steps.get_mut(index) {
            step.status = StepStatus::Completed;
            step.progress = 100;
            step.end_time = Some(Utc::now());
            step.results = Some(outputs.clone());
            self.results.insert(step.definition.id.clone(), Value::Object(outputs));
        }
        self.progress()
    }

    pub(crate) fn fail_step(&mut self, index: usize, error: String) {
        if let Some(step) = self.steps.get_mut(index) {
            step.status = StepStatus::Failed;
            step.end_time = Some(Utc::now());
            step.error = Some(error);
        }
    }

    /// Move into a terminal status. Any step still in flight is marked
    /// cancelled when the execution itself is.
    pub(crate) fn finish(&mut self, status: ExecutionStatus, error: Option<String>) {
        let now = Utc::now();
        self.status = status;
        self.end_time = Some(now);
        self.error = error;
        if status == ExecutionStatus::Cancelled {
            for step in self.steps.iter_mut().filter(|s| s.status == StepStatus::Running) {
                step.status = StepStatus::Cancelled;
                step.end_time = Some(now);
            }
        }
    }

    /// Human-facing digest of the run.
    pub fn summary(&self) -> ExecutionSummary {
        ExecutionSummary {
            workflow_name: self.workflow_name.clone(),
            target: self.target.clone(),
            duration_ms: self
                .end_time
                .map(|end| (end - self.start_time).num_milliseconds()),
            total_steps: self.steps.len(),
            completed_steps: self.completed_steps(),
            failed_steps: self.failed_steps(),
            failed_step_ids: self
                .steps
                .iter()
                .filter(|s| s.status == StepStatus::Failed)
                .map(|s| s.definition.id.clone())
                .collect(),
            progress: self.progress(),
            status: self.status,
        }
    }

    /// Status with a redacted per-step view.
    pub fn status_report(&self) -> StatusReport {
        StatusReport {
            execution_id: self.id,
            workflow_id: self.workflow_id.clone(),
            workflow_name: self.workflow_name.clone(),
            status: self.status,
            progress: self.progress(),
            current_step: self.current_step,
            steps: self
                .steps
                .iter()
                .map(|s| StepSummary {
                    name: s.definition.name.clone(),
                    status: s.status,
                    progress: s.progress,
                })
                .collect(),
            error: self.error.clone(),
        }
    }

    /// Accumulated outputs plus per-step errors.
    pub fn results_report(&self) -> ResultsReport {
        ResultsReport {
            execution_id: self.id,
            status: self.status,
            results: self.results.clone(),
            errors: self
                .steps
                .iter()
                .filter_map(|s| Some((s.definition.id.clone(), s.error.clone()?)))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub workflow_name: String,
    pub target: Value,
    /// Wall-clock duration; `None` while the run has not ended.
    pub duration_ms: Option<i64>,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub failed_step_ids: Vec<String>,
    pub progress: u8,
    pub status: ExecutionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSummary {
    pub name: String,
    pub status: StepStatus,
    pub progress: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub execution_id: Uuid,
    pub workflow_id: Option<String>,
    pub workflow_name: String,
    pub status: ExecutionStatus,
    pub progress: u8,
    pub current_step: usize,
    pub steps: Vec<StepSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsReport {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    pub results: Record,
    /// Error message per failed step id.
    pub errors: BTreeMap<String, String>,
}

/// What a finished `execute_workflow` call hands back.
///
/// `results` always carries whatever steps completed, even on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    pub results: Record,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ExecutionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub(crate) fn from_execution(execution: &Execution) -> Self {
        let success = execution.status == ExecutionStatus::Completed && execution.failed_steps() == 0;
        Self {
            success,
            execution_id: execution.id,
            status: execution.status,
            results: execution.results.clone(),
            summary: (execution.status == ExecutionStatus::Completed).then(|| execution.summary()),
            error: execution.error.clone(),
        }
    }
}
