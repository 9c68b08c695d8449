//! `/api/triggers/check` — force-run the trigger pass once.

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn check(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.orchestrator.run_trigger_pass().await;
    Json(json!({ "status": "ok" }))
}
