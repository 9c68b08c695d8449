//! API-key authentication, applied to every `/api/*` route when
//! `Config::api_key` is set. Absent a configured key, every request passes.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn require_api_key(State(state): State<AppState>, request: Request<Body>, next: Next) -> Response {
    let Some(expected) = state.config.api_key.as_deref() else {
        return next.run(request).await;
    };

    let provided = request.headers().get("x-api-key").and_then(|v| v.to_str().ok());
    if provided == Some(expected) {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "missing or invalid X-API-Key" })),
        )
            .into_response()
    }
}
