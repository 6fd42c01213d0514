//! `MockModule` — a test double for `ModuleHandler`.
//!
//! Useful in unit and integration tests where a real module implementation is
//! either unavailable or irrelevant.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use crate::{ModuleError, ModuleHandler, Record, RunOptions};

type ComputeFn = dyn Fn(&Record, &Record) -> Result<Record, ModuleError> + Send + Sync;

/// Behaviour injected into `MockModule` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON object as the step outputs.
    ReturnValue(Value),
    /// Derive the outputs from `(inputs, config)`.
    Compute(Box<ComputeFn>),
    /// Fail with [`ModuleError::Failed`].
    Fail(String),
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub inputs: Record,
    pub config: Record,
    pub options: RunOptions,
}

/// A mock module that records every call it receives and returns a
/// programmer-specified result.
pub struct MockModule {
    /// Label used in test assertions.
    pub name: String,
    /// What the module will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// All calls seen by this module (in call order).
    pub calls: Arc<Mutex<Vec<MockCall>>>,
    /// When set, `execute` parks until the gate is notified.
    gate: Option<Arc<Notify>>,
}

impl MockModule {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
            gate: None,
        }
    }

    /// Create a mock that always succeeds with the given object.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::ReturnValue(value))
    }

    /// Create a mock whose outputs are computed from its inputs and config.
    pub fn computing<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Record, &Record) -> Result<Record, ModuleError> + Send + Sync + 'static,
    {
        Self::with_behaviour(name, MockBehaviour::Compute(Box::new(f)))
    }

    /// Create a mock that always fails.
    pub fn failing(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Fail(msg.into()))
    }

    /// Hold every call in flight until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn lock_calls(&self) -> MutexGuard<'_, Vec<MockCall>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of times this module has been executed.
    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    /// Inputs of the `n`th call, if it happened.
    pub fn inputs_of_call(&self, n: usize) -> Option<Record> {
        self.lock_calls().get(n).map(|call| call.inputs.clone())
    }

    /// Snapshot of every recorded call.
    pub fn recorded_calls(&self) -> Vec<MockCall> {
        self.lock_calls().clone()
    }
}

#[async_trait]
impl ModuleHandler for MockModule {
    async fn execute(
        &self,
        inputs: &Record,
        config: &Record,
        options: &RunOptions,
    ) -> Result<Record, ModuleError> {
        self.lock_calls().push(MockCall {
            inputs: inputs.clone(),
            config: config.clone(),
            options: options.clone(),
        });

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match &self.behaviour {
            MockBehaviour::ReturnValue(Value::Object(map)) => Ok(map.clone()),
            MockBehaviour::ReturnValue(other) => Err(ModuleError::Failed(format!(
                "mock '{}' was programmed with a non-object output: {other}",
                self.name
            ))),
            MockBehaviour::Compute(f) => f(inputs, config),
            MockBehaviour::Fail(msg) => Err(ModuleError::Failed(msg.clone())),
        }
    }
}
