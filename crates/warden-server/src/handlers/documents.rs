//! Document-bound agent management — delegates to the Document Scanner and
//! the orchestrator's queue. Document paths contain `/`, which the router's
//! path-segment matching can't embed alongside a trailing literal (axum's
//! wildcard segments must terminate the route), so these take the document
//! path as a `?path=` query parameter instead of a path segment.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use warden_core::document_scanner::DocumentScanner;
use warden_kernel::document::AgentStatus;
use warden_kernel::queue::{ExecutionContext, Priority};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct DocQuery {
    pub path: String,
}

pub async fn list_documents(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let scanner = DocumentScanner::new(&state.orchestrator.vault);
    let docs = scanner.scan_all().await.map_err(|e| ApiError::Internal(e.to_string()))?;
    let documents: Vec<_> = docs
        .into_iter()
        .map(|(path, agents)| json!({ "documentPath": path, "agents": agents }))
        .collect();
    Ok(Json(json!({ "documents": documents })))
}

pub async fn document_agents(State(state): State<AppState>, Query(q): Query<DocQuery>) -> ApiResult<Json<serde_json::Value>> {
    let scanner = DocumentScanner::new(&state.orchestrator.vault);
    let entries = scanner
        .get_document_agents(&q.path)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(json!({ "agents": entries })))
}

pub async fn pending_agents(State(state): State<AppState>, Query(q): Query<DocQuery>) -> ApiResult<Json<serde_json::Value>> {
    let scanner = DocumentScanner::new(&state.orchestrator.vault);
    let entries = scanner
        .get_pending(&q.path)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(json!({ "pending": entries })))
}

pub async fn reset_agents(State(state): State<AppState>, Query(q): Query<DocQuery>) -> ApiResult<Json<serde_json::Value>> {
    let scanner = DocumentScanner::new(&state.orchestrator.vault);
    scanner
        .reset(&q.path, None)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({ "reset": true })))
}

/// Mark every agent on the document as triggered and enqueue each at once.
pub async fn run_agents(State(state): State<AppState>, Query(q): Query<DocQuery>) -> ApiResult<Json<serde_json::Value>> {
    let scanner = DocumentScanner::new(&state.orchestrator.vault);
    let entries = scanner
        .trigger_all(&q.path)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let mut queued = Vec::new();
    for entry in entries {
        scanner
            .update_status(&q.path, &entry.agent_path, AgentStatus::Running, None, None)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        let context = ExecutionContext {
            message: format!("run as scheduled ({})", entry.trigger),
            document_path: Some(q.path.clone()),
            parent_agent_path: None,
            extra: serde_json::Value::Null,
        };
        let queue_id = state
            .orchestrator
            .enqueue(&entry.agent_path, context, Priority::Normal, 0, None, None)
            .await
            .map_err(ApiError::BadRequest)?;
        queued.push(json!({ "queueId": queue_id, "agentPath": entry.agent_path }));
    }
    Ok(Json(json!({ "queued": queued })))
}

#[derive(Deserialize)]
pub struct TriggerQuery {
    pub path: String,
    pub agents: String,
}

pub async fn trigger_agents(State(state): State<AppState>, Query(q): Query<TriggerQuery>) -> ApiResult<Json<serde_json::Value>> {
    let agents: Vec<String> = q.agents.split(',').map(|s| s.trim().to_string()).collect();
    let scanner = DocumentScanner::new(&state.orchestrator.vault);
    let entries = scanner
        .trigger(&q.path, &agents)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({ "triggered": entries })))
}
