//! Session store: the active and history execution tables.
//!
//! Both tables sit behind one lock so that moving an execution from active
//! to history is a single atomic step: a cancellation and a normal
//! completion can race, and exactly one of them wins. Critical sections are
//! short bookkeeping only; no handler ever runs while the lock is held.
//!
//! Every mutation queues the event describing it before the lock is
//! released and flushes the [`EventDispatcher`] afterwards, so events leave
//! the store in the order the transitions were applied.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::events::{EventDispatcher, ExecutionEvent};
use crate::execution::{Execution, ExecutionStatus};
use crate::EngineError;

#[derive(Debug, Default)]
struct Tables {
    active: HashMap<Uuid, Execution>,
    /// Append-only; entries are frozen behind `Arc`.
    history: HashMap<Uuid, Arc<Execution>>,
    /// Ids in the order they entered history.
    history_order: Vec<Uuid>,
}

impl Tables {
    fn retire(&mut self, execution: Execution) -> Arc<Execution> {
        let frozen = Arc::new(execution);
        self.history_order.push(frozen.id);
        self.history.insert(frozen.id, Arc::clone(&frozen));
        frozen
    }
}

/// Shared handle to the execution tables. Cloning is cheap.
#[derive(Clone)]
pub struct SessionStore {
    tables: Arc<RwLock<Tables>>,
    events: Arc<EventDispatcher>,
}

impl SessionStore {
    pub fn new(events: Arc<EventDispatcher>) -> Self {
        Self {
            tables: Arc::default(),
            events,
        }
    }

    /// Register a new active execution and announce it.
    ///
    /// # Errors
    /// [`EngineError::CapacityExceeded`] when `limit` active executions exist.
    pub async fn insert_active(
        &self,
        execution: Execution,
        limit: Option<usize>,
        announce: impl FnOnce(&Execution) -> ExecutionEvent,
    ) -> Result<(), EngineError> {
        {
            let mut tables = self.tables.write().await;
            if let Some(limit) = limit {
                if tables.active.len() >= limit {
                    return Err(EngineError::CapacityExceeded(limit));
                }
            }
            self.events.enqueue(announce(&execution));
            tables.active.insert(execution.id, execution);
        }
        self.events.flush();
        Ok(())
    }

    /// Apply `f` to an active execution and publish the event it returns.
    /// Returns `None` once the execution has left the active table
    /// (finished or cancelled); nothing is published then.
    pub async fn transition<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Execution) -> (R, ExecutionEvent),
    ) -> Option<R> {
        let value = {
            let mut tables = self.tables.write().await;
            let execution = tables.active.get_mut(&id)?;
            let (value, event) = f(execution);
            self.events.enqueue(event);
            value
        };
        self.events.flush();
        Some(value)
    }

    /// Read an active execution without cloning it.
    pub async fn read_active<R>(&self, id: Uuid, f: impl FnOnce(&Execution) -> R) -> Option<R> {
        let tables = self.tables.read().await;
        tables.active.get(&id).map(f)
    }

    /// Finish an active execution with `status`, move it to history and
    /// publish the event `announce` builds from the finished record.
    /// Returns `None` if it was no longer active.
    pub async fn finalize(
        &self,
        id: Uuid,
        status: ExecutionStatus,
        error: Option<String>,
        announce: impl FnOnce(&Execution) -> ExecutionEvent,
    ) -> Option<Arc<Execution>> {
        let finished = {
            let mut tables = self.tables.write().await;
            let mut execution = tables.active.remove(&id)?;
            execution.finish(status, error);
            self.events.enqueue(announce(&execution));
            tables.retire(execution)
        };
        self.events.flush();
        Some(finished)
    }

    /// Cancel an active execution and move it to history immediately.
    pub async fn cancel(&self, id: Uuid) -> Option<Arc<Execution>> {
        self.finalize(id, ExecutionStatus::Cancelled, Some("execution cancelled".into()), |e| {
            ExecutionEvent::ExecutionCancelled { execution_id: e.id }
        })
        .await
    }

    /// Active table first, then history.
    pub async fn get(&self, id: Uuid) -> Option<Arc<Execution>> {
        let tables = self.tables.read().await;
        if let Some(active) = tables.active.get(&id) {
            return Some(Arc::new(active.clone()));
        }
        tables.history.get(&id).cloned()
    }

    /// Snapshots of every active execution.
    pub async fn list_active(&self) -> Vec<Execution> {
        let mut active: Vec<Execution> = self.tables.read().await.active.values().cloned().collect();
        active.sort_by_key(|e| e.start_time);
        active
    }

    /// History in the order executions finished.
    pub async fn list_history(&self) -> Vec<Arc<Execution>> {
        let tables = self.tables.read().await;
        tables
            .history_order
            .iter()
            .filter_map(|id| tables.history.get(id).cloned())
            .collect()
    }
}
