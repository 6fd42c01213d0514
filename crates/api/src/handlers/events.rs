//! Server-sent-events relay of lifecycle events.

use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;
use uuid::Uuid;

use super::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    /// Only relay events of this execution.
    pub execution_id: Option<Uuid>,
}

pub async fn stream(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.engine.subscribe();
    let only = query.execution_id;

    let events = BroadcastStream::new(receiver).filter_map(move |item| async move {
        let event = match item {
            Ok(event) => event,
            Err(lagged) => {
                warn!(error = %lagged, "event subscriber lagged");
                return None;
            }
        };
        if only.is_some_and(|id| id != event.execution_id()) {
            return None;
        }
        SseEvent::default()
            .event(event.name())
            .json_data(&event)
            .ok()
            .map(Ok)
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
