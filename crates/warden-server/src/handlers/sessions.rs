//! `/api/chat/sessions`, `/api/chat/session/{id}` and friends — session
//! index, lookup, archival, and deletion.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use warden_kernel::session::SessionDiscriminator;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub archived: Option<bool>,
}

pub async fn list_sessions(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Json<serde_json::Value> {
    let mut entries = state.orchestrator.sessions.list().await;

    if let Some(archived) = query.archived {
        entries.retain(|e| e.archived == archived);
    }

    entries.sort_by_key(|e| e.created_at);
    if query.sort.as_deref() != Some("oldest") {
        entries.reverse();
    }

    let total = entries.len();
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(50);
    let page: Vec<_> = entries.into_iter().skip(offset).take(limit).collect();

    Json(json!({ "sessions": page, "total": total }))
}

pub async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    let record = state
        .orchestrator
        .sessions
        .get_by_id(&id)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(json!({
        "id": record.id,
        "agentPath": record.key.agent_path,
        "agentName": record.agent_name,
        "title": record.title,
        "messages": record.messages,
        "upstreamHandle": record.upstream_handle,
        "createdAt": record.created_at,
        "lastAccessed": record.last_accessed,
        "archived": record.archived,
        "context": record.context,
    })))
}

pub async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    state
        .orchestrator
        .sessions
        .delete_by_id(&id)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(json!({ "deleted": true })))
}

pub async fn archive_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    state
        .orchestrator
        .sessions
        .set_archived(&id, true)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(json!({ "archived": true })))
}

pub async fn unarchive_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    state
        .orchestrator
        .sessions
        .set_archived(&id, false)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(json!({ "archived": false })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearBody {
    pub agent_path: String,
    #[serde(default)]
    pub document_path: Option<String>,
}

/// Legacy clear-by-agent route, predating session ids.
pub async fn clear_session(State(state): State<AppState>, Json(body): Json<ClearBody>) -> ApiResult<Json<serde_json::Value>> {
    let discriminator = body
        .document_path
        .map(SessionDiscriminator::Document)
        .unwrap_or(SessionDiscriminator::Default);
    state
        .orchestrator
        .sessions
        .clear(&body.agent_path, discriminator)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({ "cleared": true })))
}
