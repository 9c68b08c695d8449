//! Warden Server — the HTTP/SSE surface over the orchestration runtime.
//!
//! Wires the REST API described by the orchestrator's own components:
//! chat execution, the agent queue, document-bound agents, permission
//! grants, and session management. Transport concerns (routing, CORS,
//! auth, body limits) live here; everything else delegates straight into
//! `warden-core`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/health` | Liveness; `?detailed=true` adds queue/session metrics. |
//! | `GET`  | `/api/agents` | List known agent definitions. |
//! | `POST` | `/api/agents/spawn` | Enqueue one agent. |
//! | `POST` | `/api/chat` | Unary chat execution. |
//! | `POST` | `/api/chat/stream` | SSE stream of the same execution. |
//! | `GET`  | `/api/chat/sessions` | Paginated session index. |
//! | `GET`/`DELETE` | `/api/chat/session/{id}` | Load / delete a session. |
//! | `POST` | `/api/chat/session/{id}/archive` \| `/unarchive` | Flip archived flag. |
//! | `DELETE` | `/api/chat/session` | Legacy clear by agent path. |
//! | `GET`  | `/api/queue` | Queue snapshot. |
//! | `GET`  | `/api/queue/{id}/stream` | SSE stream of one queue item. |
//! | `POST` | `/api/queue/process` | Nudge the drain loop. |
//! | `GET`/`POST` | `/api/documents*` | Document-bound agent management. |
//! | `GET`  | `/api/permissions` | Pending permission requests. |
//! | `POST` | `/api/permissions/{id}/grant` \| `/deny` | Resolve a request. |
//! | `GET`  | `/api/permissions/stream` | SSE permission event stream. |
//! | `POST` | `/api/triggers/check` | Force-run the trigger pass once. |
//! | `GET`  | `/api/vault` | Vault summary. |
//! | `GET`  | `/api/search` | Substring search over vault documents. |

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// Assemble the full router: `/api/*` handlers, wrapped by auth, then CORS,
/// then tracing (outermost).
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    let api = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/agents", get(handlers::agents::list_agents))
        .route("/agents/spawn", post(handlers::agents::spawn_agent))
        .route("/chat", post(handlers::chat::chat))
        .route("/chat/stream", post(handlers::chat::stream_chat))
        .route("/chat/sessions", get(handlers::sessions::list_sessions))
        .route(
            "/chat/session/{id}",
            get(handlers::sessions::get_session).delete(handlers::sessions::delete_session),
        )
        .route("/chat/session/{id}/archive", post(handlers::sessions::archive_session))
        .route("/chat/session/{id}/unarchive", post(handlers::sessions::unarchive_session))
        .route("/chat/session", delete(handlers::sessions::clear_session))
        .route("/queue", get(handlers::queue::snapshot))
        .route("/queue/{id}/stream", get(handlers::queue::stream_item))
        .route("/queue/process", post(handlers::queue::process))
        .route("/documents", get(handlers::documents::list_documents))
        .route("/documents/agents", get(handlers::documents::document_agents))
        .route("/documents/agents/pending", get(handlers::documents::pending_agents))
        .route("/documents/run-agents", post(handlers::documents::run_agents))
        .route("/documents/reset-agents", post(handlers::documents::reset_agents))
        .route("/documents/trigger", post(handlers::documents::trigger_agents))
        .route("/permissions", get(handlers::permissions::list_permissions))
        .route("/permissions/{id}/grant", post(handlers::permissions::grant))
        .route("/permissions/{id}/deny", post(handlers::permissions::deny))
        .route("/permissions/stream", get(handlers::permissions::stream_permissions))
        .route("/triggers/check", post(handlers::triggers::check))
        .route("/vault", get(handlers::vault::summary))
        .route("/search", get(handlers::vault::search))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::require_api_key));

    let cors = if config.cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = config.cors_origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(config.max_message_bytes.max(1 << 20)))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
