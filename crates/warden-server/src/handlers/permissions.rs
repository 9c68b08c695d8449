//! `/api/permissions`, `/api/permissions/{id}/grant`, `/deny`, and the
//! singleton permission event stream.

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::{Stream, StreamExt};
use serde_json::json;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::state::AppState;

pub async fn list_permissions(State(state): State<AppState>) -> Json<serde_json::Value> {
    let pending = state.orchestrator.permissions.list_pending().await;
    Json(json!({ "pending": pending }))
}

pub async fn grant(State(state): State<AppState>, Path(id): Path<String>) -> Json<serde_json::Value> {
    let granted = state.orchestrator.permissions.grant(&id).await;
    Json(json!({ "granted": granted }))
}

pub async fn deny(State(state): State<AppState>, Path(id): Path<String>) -> Json<serde_json::Value> {
    let denied = state.orchestrator.permissions.deny(&id).await;
    Json(json!({ "denied": denied }))
}

/// Replays the pending set on connect, then forwards live grant/deny/request
/// notices. `PermissionBroker::subscribe` only yields tagged strings
/// (`"permissionGranted:<id>"` and the like) — this is where they get
/// reshaped into the JSON event bodies clients expect.
pub async fn stream_permissions(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let broker = state.orchestrator.permissions.clone();
    let mut sub = broker.subscribe().await;
    let pending = broker.list_pending().await;

    let (tx, out) = tokio::sync::mpsc::unbounded_channel::<serde_json::Value>();
    let _ = tx.send(json!({ "type": "connected" }));
    for req in pending {
        let _ = tx.send(json!({ "type": "permissionRequest", "request": req }));
    }

    tokio::spawn(async move {
        while let Ok(raw) = sub.recv().await {
            let Some((kind, id)) = raw.split_once(':') else { continue };
            let payload = match kind {
                "permissionRequest" => match broker.list_pending().await.into_iter().find(|r| r.id == id) {
                    Some(req) => json!({ "type": "permissionRequest", "request": req }),
                    None => continue,
                },
                "permissionGranted" => json!({ "type": "permissionGranted", "id": id }),
                "permissionDenied" => json!({ "type": "permissionDenied", "id": id }),
                _ => continue,
            };
            if tx.send(payload).is_err() {
                break;
            }
        }
    });

    let stream = UnboundedReceiverStream::new(out).map(|value| Ok(Event::default().data(value.to_string())));
    Sse::new(stream).keep_alive(KeepAlive::default())
}
