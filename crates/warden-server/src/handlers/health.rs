//! `/api/health` — liveness, with optional deep metrics via `?detailed=true`.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::state::AppState;

#[derive(Deserialize)]
pub struct HealthQuery {
    #[serde(default)]
    pub detailed: bool,
}

pub async fn health(State(state): State<AppState>, Query(query): Query<HealthQuery>) -> Json<serde_json::Value> {
    if !query.detailed {
        return Json(json!({ "status": "ok" }));
    }

    let snapshot = state.orchestrator.queue.snapshot().await;
    let sessions = state.orchestrator.sessions.list().await;
    let pending_permissions = state.orchestrator.permissions.list_pending().await;

    Json(json!({
        "status": "ok",
        "uptimeSecs": (chrono::Utc::now() - state.started_at).num_seconds(),
        "queue": {
            "pending": snapshot.pending.len(),
            "running": snapshot.running.len(),
            "completed": snapshot.completed.len(),
        },
        "sessions": {
            "indexed": sessions.len(),
        },
        "permissions": {
            "pending": pending_permissions.len(),
        },
    }))
}
