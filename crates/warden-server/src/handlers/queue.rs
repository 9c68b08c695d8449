//! `/api/queue`, `/api/queue/{id}/stream`, `/api/queue/process`.

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::{Stream, StreamExt};
use serde_json::json;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::state::AppState;

pub async fn snapshot(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.orchestrator.queue.snapshot().await;
    Json(json!({
        "pending": snapshot.pending,
        "running": snapshot.running,
        "completed": snapshot.completed,
    }))
}

pub async fn process(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.orchestrator.clone().drain_once().await;
    Json(json!({ "status": "ok" }))
}

pub async fn stream_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let mut rx = state.orchestrator.events.subscribe(&id).await;
    let (tx, out) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if tx.send(event).is_err() {
                break;
            }
        }
    });

    let stream = UnboundedReceiverStream::new(out).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(data))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
