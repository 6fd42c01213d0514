//! Behavioural tests for the execution engine.
//!
//! Every test wires the engine to `MockModule`s so the assertions concern
//! only orchestration: ordering, input binding, failure policy, progress,
//! cancellation and history.

use std::sync::{Arc, Barrier};

use modules::mock::MockModule;
use modules::{builtin, ModuleError, ModuleRegistry, Record, RunOptions};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::events::{ChannelSink, EventSink, FanoutSink};
use crate::{
    EngineConfig, EngineError, ExecutionEngine, ExecutionEvent, ExecutionStatus, StepDefinition,
    StepStatus, TemplateCatalog, WorkflowDefinition,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn engine_with(
    modules: Vec<(&str, Arc<MockModule>)>,
) -> (ExecutionEngine, mpsc::UnboundedReceiver<ExecutionEvent>) {
    engine_with_sinks(modules, vec![])
}

/// Like `engine_with`, with `extra` sinks receiving events after the channel.
fn engine_with_sinks(
    modules: Vec<(&str, Arc<MockModule>)>,
    extra: Vec<Arc<dyn EventSink>>,
) -> (ExecutionEngine, mpsc::UnboundedReceiver<ExecutionEvent>) {
    let mut registry = ModuleRegistry::new();
    for (id, handler) in modules {
        registry.register(id, handler);
    }
    let (sink, rx) = ChannelSink::channel();
    let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(sink)];
    sinks.extend(extra);
    let engine = ExecutionEngine::new(
        Arc::new(registry),
        Arc::new(TemplateCatalog::new()),
        EngineConfig::default(),
    )
    .with_sink(Arc::new(FanoutSink::new(sinks)));
    (engine, rx)
}

/// Blocks delivery of `StepCompleted` for `step_id` until the test lets go,
/// which parks the driving task between two steps.
struct PauseAfterStep {
    step_id: &'static str,
    reached: Arc<Notify>,
    release: Arc<Barrier>,
}

impl EventSink for PauseAfterStep {
    fn publish(&self, event: ExecutionEvent) {
        if let ExecutionEvent::StepCompleted { step_id, .. } = &event {
            if step_id == self.step_id {
                self.reached.notify_one();
                self.release.wait();
            }
        }
    }
}

fn step(id: &str, order: u32, module: &str) -> StepDefinition {
    StepDefinition::new(id, id.to_uppercase(), "test", order, module)
}

/// Build a workflow over `ids`, each step running `module`.
fn linear_workflow(ids: &[&str], module: &str) -> WorkflowDefinition {
    let steps = ids
        .iter()
        .enumerate()
        .map(|(i, id)| step(id, i as u32 + 1, module))
        .collect();
    WorkflowDefinition::ad_hoc("test-linear", steps)
}

fn record(v: Value) -> Record {
    v.as_object().cloned().unwrap_or_default()
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// `{x: target}` for a step without `x`, `{y: x + "!"}` otherwise.
fn echo() -> Arc<MockModule> {
    Arc::new(MockModule::computing("echo", |inputs, _config| {
        match inputs.get("x").and_then(Value::as_str) {
            Some(x) => Ok(record(json!({ "y": format!("{x}!") }))),
            None => Ok(record(json!({ "x": inputs["target"].clone() }))),
        }
    }))
}

// ============================================================
// Happy path and data flow
// ============================================================

#[tokio::test]
async fn echo_chain_threads_outputs_into_inputs() {
    let (engine, _rx) = engine_with(vec![("echo", echo())]);
    let workflow = WorkflowDefinition {
        id: Some("t1".into()),
        name: "t1".into(),
        steps: vec![
            step("a", 1, "echo").with_outputs(&["x"]),
            step("b", 2, "echo").with_inputs(&["x"]).with_outputs(&["y"]),
        ],
    };

    let result = engine
        .execute_workflow(&workflow, json!("foo"), RunOptions::default())
        .await
        .expect("execution starts");

    assert!(result.success);
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(Value::Object(result.results), json!({ "a": { "x": "foo" }, "b": { "y": "foo!" } }));

    let summary = result.summary.expect("successful runs carry a summary");
    assert_eq!(summary.total_steps, 2);
    assert_eq!(summary.completed_steps, 2);
    assert_eq!(summary.failed_steps, 0);
    assert_eq!(summary.progress, 100);
    assert!(summary.duration_ms.is_some());

    let execution = engine.get_execution(result.execution_id).await.unwrap();
    assert_eq!(engine.generate_execution_summary(&execution), summary);
}

#[tokio::test]
async fn bound_input_equals_producer_output_exactly() {
    let produced = json!({ "hosts": ["a.example.com", "b.example.com"], "meta": { "n": 2 } });
    let producer = Arc::new(MockModule::returning("producer", json!({ "payload": produced.clone() })));
    let consumer = Arc::new(MockModule::returning("consumer", json!({})));
    let (engine, _rx) = engine_with(vec![("producer", producer), ("consumer", consumer.clone())]);

    let workflow = WorkflowDefinition::ad_hoc(
        "binding",
        vec![
            step("p", 1, "producer").with_outputs(&["payload"]),
            step("c", 2, "consumer").with_inputs(&["payload", "never_produced"]),
        ],
    );
    engine
        .execute_workflow(&workflow, json!({ "host": "example.com" }), RunOptions::default())
        .await
        .unwrap();

    let inputs = consumer.inputs_of_call(0).expect("consumer ran");
    assert_eq!(inputs["payload"], produced);
    assert_eq!(inputs["target"], json!({ "host": "example.com" }));
    assert!(!inputs.contains_key("never_produced"));
}

#[tokio::test]
async fn handler_receives_effective_config_and_options() {
    let mock = Arc::new(MockModule::returning("cfg", json!({})));
    let (engine, _rx) = engine_with(vec![("cfg", mock.clone())]);

    let workflow = WorkflowDefinition::ad_hoc(
        "config",
        vec![step("s", 1, "cfg")
            .with_option(crate::ConfigOption::integer("threads", 8, Some(1), Some(64)))
            .with_option(crate::ConfigOption::boolean("verbose", false))
            .with_config("verbose", json!(true))],
    );
    let mut options = RunOptions::default();
    options.extra.insert("operator".into(), json!("alice"));

    engine.execute_workflow(&workflow, json!("t"), options).await.unwrap();

    let call = &mock.recorded_calls()[0];
    assert_eq!(call.config, record(json!({ "threads": 8, "verbose": true })));
    assert_eq!(call.options.extra["operator"], "alice");
    assert!(call.options.safe_mode);
}

// ============================================================
// Ordering and events
// ============================================================

#[tokio::test]
async fn steps_start_in_template_order_every_run() {
    let mock = Arc::new(MockModule::returning("m", json!({ "ok": true })));
    let (engine, mut rx) = engine_with(vec![("m", mock.clone())]);
    let workflow = linear_workflow(&["s0", "s1", "s2", "s3"], "m");

    for _ in 0..3 {
        engine.execute_workflow(&workflow, json!("t"), RunOptions::default()).await.unwrap();
        let started: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                ExecutionEvent::StepStarted { step_id, .. } => Some(step_id),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec!["s0", "s1", "s2", "s3"]);
    }
    assert_eq!(mock.call_count(), 12);
}

#[tokio::test]
async fn event_sequence_follows_state_transitions() {
    let (engine, mut rx) = engine_with(vec![
        ("ok", Arc::new(MockModule::returning("ok", json!({})))),
        ("boom", Arc::new(MockModule::failing("boom", "kaput"))),
    ]);
    let workflow = WorkflowDefinition::ad_hoc("events", vec![step("a", 1, "ok"), step("b", 2, "boom")]);

    let result = engine.execute_workflow(&workflow, json!("t"), RunOptions::default()).await.unwrap();

    let events = drain(&mut rx);
    let names: Vec<&str> = events.iter().map(ExecutionEvent::name).collect();
    assert_eq!(
        names,
        vec![
            "execution_started",
            "step_started",
            "step_completed",
            "step_started",
            "step_failed",
            "execution_failed",
        ]
    );
    assert!(events.iter().all(|e| e.execution_id() == result.execution_id));
}

#[tokio::test]
async fn progress_is_monotonic_and_ends_at_100() {
    let (engine, mut rx) = engine_with(vec![("m", Arc::new(MockModule::returning("m", json!({}))))]);
    let workflow = linear_workflow(&["a", "b", "c"], "m");

    let result = engine.execute_workflow(&workflow, json!("t"), RunOptions::default()).await.unwrap();

    let progress: Vec<u8> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            ExecutionEvent::StepCompleted { progress, .. } => Some(progress),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![33, 67, 100]);

    let status = engine.get_execution_status(result.execution_id).await.unwrap();
    assert_eq!(status.progress, 100);
    assert_eq!(status.status, ExecutionStatus::Completed);
    assert_eq!(status.current_step, 2);
    assert_eq!(status.steps.len(), 3);
    assert!(status.steps.iter().all(|s| s.progress == 100));
}

// ============================================================
// Failure policy
// ============================================================

#[tokio::test]
async fn first_failure_stops_the_run_by_default() {
    let ok = Arc::new(MockModule::returning("ok", json!({ "ok": true })));
    let boom = Arc::new(MockModule::failing("boom", "something broke irreparably"));
    let never = Arc::new(MockModule::returning("never", json!({ "should": "not run" })));
    let (engine, _rx) = engine_with(vec![("ok", ok), ("boom", boom), ("never", never.clone())]);

    let workflow = WorkflowDefinition::ad_hoc(
        "fail-fast",
        vec![step("ok", 1, "ok"), step("boom", 2, "boom"), step("never", 3, "never")],
    );
    let result = engine.execute_workflow(&workflow, json!("t"), RunOptions::default()).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.error.as_deref().unwrap().contains("boom"));
    assert_eq!(Value::Object(result.results), json!({ "ok": { "ok": true } }));
    assert_eq!(never.call_count(), 0);

    let execution = engine.get_execution(result.execution_id).await.unwrap();
    assert_eq!(execution.steps[1].status, StepStatus::Failed);
    assert_eq!(
        execution.steps[1].error.as_deref(),
        Some("module execution failed: something broke irreparably")
    );
    assert_eq!(execution.steps[2].status, StepStatus::Pending);
    assert_eq!(execution.current_step, 1);
}

#[tokio::test]
async fn continue_on_error_keeps_going_but_reports_failure() {
    let (engine, _rx) = engine_with(vec![
        ("ok", Arc::new(MockModule::returning("ok", json!({ "v": 1 })))),
        ("boom", Arc::new(MockModule::failing("boom", "nope"))),
    ]);
    let workflow = WorkflowDefinition::ad_hoc(
        "tolerant",
        vec![step("one", 1, "ok"), step("two", 2, "boom"), step("three", 3, "ok")],
    );

    let result = engine
        .execute_workflow(&workflow, json!("t"), RunOptions::continue_on_error())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert!(result.results.contains_key("one"));
    assert!(result.results.contains_key("three"));
    assert!(!result.results.contains_key("two"));
    assert_eq!(result.error.as_deref(), Some("1 step(s) failed: two"));

    let summary = result.summary.unwrap();
    assert_eq!(summary.failed_steps, 1);
    assert_eq!(summary.failed_step_ids, vec!["two"]);
    assert_eq!(summary.progress, 67);

    let errors = engine.get_execution_results(result.execution_id).await.unwrap().errors;
    assert_eq!(errors["two"], "module execution failed: nope");
}

#[tokio::test]
async fn unknown_module_is_a_step_failure() {
    let (engine, _rx) = engine_with(vec![]);
    let workflow = WorkflowDefinition::ad_hoc("ghost", vec![step("a", 1, "ghost_scanner")]);

    let result = engine.execute_workflow(&workflow, json!("t"), RunOptions::default()).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.status, ExecutionStatus::Failed);
    let execution = engine.get_execution(result.execution_id).await.unwrap();
    assert_eq!(
        execution.steps[0].error.as_deref(),
        Some(ModuleError::NotFound("ghost_scanner".into()).to_string().as_str())
    );
}

// ============================================================
// Errors before an execution exists
// ============================================================

#[tokio::test]
async fn unknown_template_never_creates_an_execution() {
    let (engine, mut rx) = engine_with(vec![]);
    let err = engine
        .execute_workflow_from_template("missing", json!("t"), RunOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::TemplateNotFound(id) if id == "missing"));
    assert!(engine.list_executions().await.is_empty());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn empty_workflow_is_rejected_up_front() {
    let (engine, _rx) = engine_with(vec![]);
    let err = engine
        .execute_workflow(&WorkflowDefinition::ad_hoc("empty", vec![]), json!("t"), RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert!(engine.list_executions().await.is_empty());
}

#[tokio::test]
async fn unknown_execution_id() {
    let (engine, _rx) = engine_with(vec![]);
    let id = Uuid::new_v4();
    assert!(matches!(
        engine.get_execution_status(id).await,
        Err(EngineError::ExecutionNotFound(missing)) if missing == id
    ));
    assert!(engine.get_execution_results(id).await.is_err());
    assert!(!engine.cancel_execution(id).await);
}

// ============================================================
// History and cancellation
// ============================================================

#[tokio::test]
async fn terminal_lookups_are_stable() {
    let (engine, _rx) = engine_with(vec![("echo", echo())]);
    let workflow = linear_workflow(&["a"], "echo");
    let result = engine.execute_workflow(&workflow, json!("foo"), RunOptions::default()).await.unwrap();

    let first = engine.get_execution_status(result.execution_id).await.unwrap();
    let second = engine.get_execution_status(result.execution_id).await.unwrap();
    assert_eq!(first, second);

    let first = engine.get_execution_results(result.execution_id).await.unwrap();
    let second = engine.get_execution_results(result.execution_id).await.unwrap();
    assert_eq!(first, second);

    // Finished executions cannot be cancelled.
    assert!(!engine.cancel_execution(result.execution_id).await);
}

#[tokio::test]
async fn cancellation_mid_step_discards_late_output() {
    let gate = Arc::new(Notify::new());
    let first = Arc::new(MockModule::returning("first", json!({ "x": 1 })));
    let second = Arc::new(MockModule::returning("second", json!({ "y": 2 })).gated(gate.clone()));
    let third = Arc::new(MockModule::returning("third", json!({ "z": 3 })));
    let (engine, _rx) = engine_with(vec![
        ("first", first),
        ("second", second.clone()),
        ("third", third.clone()),
    ]);
    let engine = Arc::new(engine);
    let mut events = engine.subscribe();

    let workflow = WorkflowDefinition::ad_hoc(
        "cancel",
        vec![step("a", 1, "first"), step("b", 2, "second"), step("c", 3, "third")],
    );
    let run = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.execute_workflow(&workflow, json!("t"), RunOptions::default()).await }
    });

    // Wait until step b is in flight.
    let execution_id = loop {
        match events.recv().await.unwrap() {
            ExecutionEvent::StepStarted { execution_id, step_id, .. } if step_id == "b" => break execution_id,
            _ => continue,
        }
    };

    assert!(engine.cancel_execution(execution_id).await);
    assert!(!engine.cancel_execution(execution_id).await);
    let status = engine.get_execution_status(execution_id).await.unwrap();
    assert_eq!(status.status, ExecutionStatus::Cancelled);

    gate.notify_one();
    let result = run.await.unwrap().unwrap();

    assert!(!result.success);
    assert_eq!(result.status, ExecutionStatus::Cancelled);
    assert_eq!(Value::Object(result.results), json!({ "a": { "x": 1 } }));
    assert_eq!(second.call_count(), 1);
    assert_eq!(third.call_count(), 0);

    let execution = engine.get_execution(execution_id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert_eq!(execution.steps[1].status, StepStatus::Cancelled);
    assert_eq!(execution.steps[2].status, StepStatus::Pending);
    assert_eq!(
        engine.get_execution_status(execution_id).await.unwrap().status,
        ExecutionStatus::Cancelled
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_at_step_boundary_stops_before_next_step() {
    let reached = Arc::new(Notify::new());
    let release = Arc::new(Barrier::new(2));
    let pause = PauseAfterStep {
        step_id: "a",
        reached: reached.clone(),
        release: release.clone(),
    };
    let first = Arc::new(MockModule::returning("first", json!({ "x": 1 })));
    let second = Arc::new(MockModule::returning("second", json!({ "y": 2 })));
    let (engine, mut rx) = engine_with_sinks(
        vec![("first", first), ("second", second.clone())],
        vec![Arc::new(pause)],
    );
    let engine = Arc::new(engine);

    let workflow = WorkflowDefinition::ad_hoc("boundary", vec![step("a", 1, "first"), step("b", 2, "second")]);
    let run = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.execute_workflow(&workflow, json!("t"), RunOptions::default()).await }
    });

    // Step a is completed and the driver is parked before step b.
    reached.notified().await;
    let execution_id = engine.list_executions().await[0].execution_id;

    // Delivery is busy with the parked event, so the cancel call itself
    // returns only after the driver is released.
    let cancel = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.cancel_execution(execution_id).await }
    });
    while engine.get_execution_status(execution_id).await.unwrap().status != ExecutionStatus::Cancelled {
        tokio::task::yield_now().await;
    }
    tokio::task::spawn_blocking(move || release.wait()).await.unwrap();

    assert!(cancel.await.unwrap());
    let result = run.await.unwrap().unwrap();

    assert_eq!(result.status, ExecutionStatus::Cancelled);
    assert!(!result.success);
    assert_eq!(Value::Object(result.results), json!({ "a": { "x": 1 } }));
    assert_eq!(second.call_count(), 0);

    let execution = engine.get_execution(execution_id).await.unwrap();
    assert_eq!(execution.steps[0].status, StepStatus::Completed);
    assert_eq!(execution.steps[1].status, StepStatus::Pending);
    for _ in 0..2 {
        assert_eq!(
            engine.get_execution_status(execution_id).await.unwrap().status,
            ExecutionStatus::Cancelled
        );
    }

    let names: Vec<&str> = drain(&mut rx).iter().map(ExecutionEvent::name).collect();
    assert_eq!(
        names,
        vec!["execution_started", "step_started", "step_completed", "execution_cancelled"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn terminal_event_is_always_last_under_racing_cancel() {
    for _ in 0..200 {
        let (engine, mut rx) = engine_with(vec![("m", Arc::new(MockModule::returning("m", json!({}))))]);
        let engine = Arc::new(engine);
        let mut events = engine.subscribe();

        let run = tokio::spawn({
            let engine = Arc::clone(&engine);
            let workflow = linear_workflow(&["a", "b", "c", "d"], "m");
            async move { engine.execute_workflow(&workflow, json!("t"), RunOptions::default()).await }
        });

        let execution_id = loop {
            match events.recv().await.unwrap() {
                ExecutionEvent::StepStarted { execution_id, step_id, .. } if step_id == "b" => break execution_id,
                _ => continue,
            }
        };
        engine.cancel_execution(execution_id).await;
        run.await.unwrap().unwrap();

        let delivered = drain(&mut rx);
        let terminal: Vec<usize> = delivered
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_terminal())
            .map(|(i, _)| i)
            .collect();
        let names: Vec<&str> = delivered.iter().map(ExecutionEvent::name).collect();
        assert_eq!(terminal, vec![delivered.len() - 1], "{names:?}");
        assert_eq!(names[0], "execution_started");
    }
}

// ============================================================
// Concurrency
// ============================================================

#[tokio::test]
async fn executions_run_independently() {
    let gate = Arc::new(Notify::new());
    let slow = Arc::new(MockModule::returning("slow", json!({ "slow": true })).gated(gate.clone()));
    let fast = Arc::new(MockModule::returning("fast", json!({ "fast": true })));
    let (engine, _rx) = engine_with(vec![("slow", slow), ("fast", fast)]);
    let engine = Arc::new(engine);

    let slow_id = engine
        .start_workflow(linear_workflow(&["s"], "slow"), json!("a"), RunOptions::default())
        .await
        .unwrap();

    // The blocked execution does not hold up another one.
    let fast_result = engine
        .execute_workflow(&linear_workflow(&["f"], "fast"), json!("b"), RunOptions::default())
        .await
        .unwrap();
    assert!(fast_result.success);

    let slow_status = engine.get_execution_status(slow_id).await.unwrap();
    assert_eq!(slow_status.status, ExecutionStatus::Running);
    assert_eq!(engine.list_executions().await.len(), 2);

    gate.notify_one();
    let mut events = engine.subscribe();
    if engine.get_execution_status(slow_id).await.unwrap().status == ExecutionStatus::Running {
        loop {
            let event = events.recv().await.unwrap();
            if event.execution_id() == slow_id && event.is_terminal() {
                break;
            }
        }
    }
    assert_eq!(
        engine.get_execution_status(slow_id).await.unwrap().status,
        ExecutionStatus::Completed
    );
}

#[tokio::test]
async fn active_limit_rejects_extra_runs() {
    let gate = Arc::new(Notify::new());
    let slow = Arc::new(MockModule::returning("slow", json!({})).gated(gate.clone()));
    let mut registry = ModuleRegistry::new();
    registry.register("slow", slow);
    let engine = Arc::new(ExecutionEngine::new(
        Arc::new(registry),
        Arc::new(TemplateCatalog::new()),
        EngineConfig {
            max_active_executions: Some(1),
            ..EngineConfig::default()
        },
    ));

    engine
        .start_workflow(linear_workflow(&["s"], "slow"), json!("a"), RunOptions::default())
        .await
        .unwrap();
    let err = engine
        .start_workflow(linear_workflow(&["s"], "slow"), json!("b"), RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CapacityExceeded(1)));
    gate.notify_one();
}

// ============================================================
// Built-in modules end to end
// ============================================================

#[tokio::test]
async fn builtin_web_recon_template_runs_to_completion() {
    let mut registry = ModuleRegistry::new();
    builtin::register_builtin(&mut registry);
    let engine = ExecutionEngine::new(
        Arc::new(registry),
        Arc::new(TemplateCatalog::with_builtin_templates().unwrap()),
        EngineConfig::default(),
    );

    let result = engine
        .execute_workflow_from_template("web-recon", json!("example.com"), RunOptions::default())
        .await
        .unwrap();

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.results.len(), 5);
    let report = &result.results["report"]["report"];
    assert_eq!(report["target"], "example.com");
    assert_eq!(report["counts"]["subdomains"], 3);

    let status = engine.get_execution_status(result.execution_id).await.unwrap();
    assert_eq!(status.workflow_id.as_deref(), Some("web-recon"));
}
