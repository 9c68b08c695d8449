//! `/api/chat`, `/api/chat/stream` — the unary and streaming execution entry
//! points. Both resolve the same request shape; streaming just forwards the
//! orchestrator's event stream as SSE instead of waiting for the final result.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::{Stream, StreamExt};
use serde::Deserialize;

use warden_core::document_scanner::DocumentScanner;
use warden_core::orchestrator::ChatRequest;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    pub message: String,
    #[serde(default)]
    pub agent_path: Option<String>,
    #[serde(default)]
    pub document_path: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub initial_context: Option<serde_json::Value>,
}

async fn resolve_request(state: &AppState, body: ChatBody) -> ApiResult<ChatRequest> {
    if body.message.len() > state.config.max_message_bytes {
        return Err(ApiError::TooLarge(format!(
            "message exceeds {} bytes",
            state.config.max_message_bytes
        )));
    }

    let agent_path = match (body.agent_path, &body.document_path) {
        (Some(path), _) => path,
        (None, Some(doc)) => {
            let scanner = DocumentScanner::new(&state.orchestrator.vault);
            let entries = scanner
                .get_document_agents(doc)
                .await
                .map_err(|e| ApiError::NotFound(e.to_string()))?;
            entries
                .first()
                .map(|e| e.agent_path.clone())
                .ok_or_else(|| ApiError::BadRequest(format!("{doc} has no bound agent")))?
        }
        (None, None) => {
            return Err(ApiError::BadRequest("agentPath or documentPath is required".into()));
        }
    };

    Ok(ChatRequest {
        agent_path,
        message: body.message,
        document_path: body.document_path,
        session_id: body.session_id,
        initial_context: body.initial_context,
        depth: 0,
    })
}

pub async fn chat(State(state): State<AppState>, Json(body): Json<ChatBody>) -> ApiResult<Json<serde_json::Value>> {
    let req = resolve_request(&state, body).await?;
    let value = match state.orchestrator.run_chat(req).await {
        Ok(response) => serde_json::to_value(response),
        Err(failure) => serde_json::to_value(failure),
    };
    Ok(Json(value.map_err(|e| ApiError::Internal(e.to_string()))?))
}

pub async fn stream_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>> {
    let req = resolve_request(&state, body).await?;
    let orchestrator = state.orchestrator.clone();
    let events = orchestrator.run_chat_stream(req);
    let sse = events.map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(data))
    });
    Ok(Sse::new(sse).keep_alive(KeepAlive::default()))
}
