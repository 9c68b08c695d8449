//! `/api/vault`, `/api/search` — vault summary and substring search.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn summary(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let docs = state
        .orchestrator
        .vault
        .scan("**/*.md")
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({
        "root": state.orchestrator.vault.root().display().to_string(),
        "documentCount": docs.len(),
    })))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

pub async fn search(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> ApiResult<Json<serde_json::Value>> {
    if query.q.trim().is_empty() {
        return Err(ApiError::BadRequest("q is required".into()));
    }
    let needle = query.q.to_lowercase();

    let paths = state
        .orchestrator
        .vault
        .scan("**/*.md")
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let mut matches = Vec::new();
    for path in paths {
        let Ok((_, body)) = state.orchestrator.vault.read(&path).await else {
            continue;
        };
        let haystack = body.to_lowercase();
        if let Some(idx) = haystack.find(&needle) {
            let start = floor_char_boundary(&haystack, idx.saturating_sub(40));
            let end = ceil_char_boundary(&haystack, (idx + needle.len() + 40).min(haystack.len()));
            matches.push(json!({
                "path": path,
                "snippet": haystack[start..end].trim(),
            }));
        }
    }
    Ok(Json(json!({ "matches": matches })))
}
