//! Lifecycle events and the sinks that receive them.
//!
//! The engine publishes one event per state transition, in transition order.
//! Consumers either subscribe to the engine's broadcast channel or plug an
//! [`EventSink`] into it (persist, stream to a UI, log, observe from a test).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use modules::Record;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use crate::execution::ExecutionSummary;

/// Events emitted during workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    ExecutionStarted {
        execution_id: Uuid,
        workflow_id: Option<String>,
        workflow_name: String,
        total_steps: usize,
    },
    StepStarted {
        execution_id: Uuid,
        step_index: usize,
        step_id: String,
        step_name: String,
    },
    StepCompleted {
        execution_id: Uuid,
        step_index: usize,
        step_id: String,
        progress: u8,
        outputs: Record,
    },
    StepFailed {
        execution_id: Uuid,
        step_index: usize,
        step_id: String,
        error: String,
    },
    ExecutionCompleted {
        execution_id: Uuid,
        success: bool,
        summary: ExecutionSummary,
    },
    ExecutionFailed {
        execution_id: Uuid,
        error: String,
    },
    ExecutionCancelled {
        execution_id: Uuid,
    },
}

impl ExecutionEvent {
    /// Wire name of the event, e.g. `step_started`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExecutionStarted { .. }   => "execution_started",
            Self::StepStarted { .. }        => "step_started",
            Self::StepCompleted { .. }      => "step_completed",
            Self::StepFailed { .. }         => "step_failed",
            Self::ExecutionCompleted { .. } => "execution_completed",
            Self::ExecutionFailed { .. }    => "execution_failed",
            Self::ExecutionCancelled { .. } => "execution_cancelled",
        }
    }

    pub fn execution_id(&self) -> Uuid {
        match self {
            Self::ExecutionStarted { execution_id, .. }
            | Self::StepStarted { execution_id, .. }
            | Self::StepCompleted { execution_id, .. }
            | Self::StepFailed { execution_id, .. }
            | Self::ExecutionCompleted { execution_id, .. }
            | Self::ExecutionFailed { execution_id, .. }
            | Self::ExecutionCancelled { execution_id } => *execution_id,
        }
    }

    /// True for the last event an execution emits.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ExecutionCompleted { .. } | Self::ExecutionFailed { .. } | Self::ExecutionCancelled { .. }
        )
    }
}

/// Receiver of lifecycle events.
///
/// `publish` is called synchronously and one event at a time, so a sink that
/// blocks holds up delivery for every execution.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&self, _event: ExecutionEvent) {}
}

/// Logs every event at debug level.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: ExecutionEvent) {
        debug!(execution_id = %event.execution_id(), event = event.name(), "lifecycle event");
    }
}

/// Forwards events into an unbounded mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    // Unbounded so a slow consumer never stalls an execution; volume is a
    // handful of events per step.
    sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
        Self { sender }
    }

    /// A sink plus the receiving half.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: ExecutionEvent) {
        // Receiver may have been dropped.
        let _ = self.sender.send(event);
    }
}

/// Fans every event out to several sinks, in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn publish(&self, event: ExecutionEvent) {
        for sink in &self.sinks {
            sink.publish(event.clone());
        }
    }
}

/// The engine-owned broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: ExecutionEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}

// ---------------------------------------------------------------------------
// EventDispatcher
// ---------------------------------------------------------------------------

/// Delivers events to the broadcast bus and the sink in the order they were
/// queued.
///
/// The session store queues an event while it still holds the lock that
/// guarded the matching state change, and flushes once the lock is released.
/// Delivery itself is serialized, so every consumer sees the events of an
/// execution in transition order, even when a cancellation races the task
/// driving it.
pub struct EventDispatcher {
    bus: EventBus,
    sink: Arc<dyn EventSink>,
    pending: Mutex<VecDeque<ExecutionEvent>>,
    delivering: Mutex<()>,
}

impl EventDispatcher {
    pub fn new(capacity: usize, sink: Arc<dyn EventSink>) -> Self {
        Self {
            bus: EventBus::new(capacity),
            sink,
            pending: Mutex::new(VecDeque::new()),
            delivering: Mutex::new(()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.bus.subscribe()
    }

    pub fn enqueue(&self, event: ExecutionEvent) {
        lock(&self.pending).push_back(event);
    }

    /// Deliver everything queued so far. When this returns, every event
    /// queued before the call has reached the bus and the sink.
    pub fn flush(&self) {
        let _delivering = lock(&self.delivering);
        loop {
            // The queue lock is released before delivery so producers never
            // wait on a sink.
            let Some(event) = lock(&self.pending).pop_front() else {
                break;
            };
            self.bus.publish(event.clone());
            self.sink.publish(event);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
