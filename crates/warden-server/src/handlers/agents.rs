//! `/api/agents`, `/api/agents/spawn` — agent discovery and queued spawning.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use warden_core::agent_loader::AgentLoader;
use warden_kernel::queue::{ExecutionContext, Priority};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn list_agents(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let paths = state
        .orchestrator
        .vault
        .scan("agents/**/*.md")
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let loader = AgentLoader::new(&state.orchestrator.vault);
    let mut agents = Vec::new();
    for path in paths {
        match loader.load(&path).await {
            Ok(def) => agents.push(def),
            Err(e) => tracing::warn!("skipping unloadable agent {path}: {e}"),
        }
    }
    Ok(Json(json!({ "agents": agents })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnRequest {
    pub agent_path: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub scheduled_for: Option<chrono::DateTime<chrono::Utc>>,
}

pub async fn spawn_agent(
    State(state): State<AppState>,
    Json(req): Json<SpawnRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if req.agent_path.trim().is_empty() {
        return Err(ApiError::BadRequest("agentPath is required".into()));
    }

    let context = ExecutionContext {
        message: req.message,
        document_path: None,
        parent_agent_path: None,
        extra: req.context.unwrap_or(serde_json::Value::Null),
    };

    let queue_id = state
        .orchestrator
        .enqueue(
            &req.agent_path,
            context,
            req.priority.unwrap_or_default(),
            0,
            None,
            req.scheduled_for,
        )
        .await
        .map_err(|e| {
            if e.to_lowercase().contains("full") || e.to_lowercase().contains("exceed") {
                ApiError::CapacityExceeded(e)
            } else {
                ApiError::BadRequest(e)
            }
        })?;

    Ok(Json(json!({ "queueId": queue_id, "agentPath": req.agent_path })))
}
