//! Shared application state injected into every handler via axum's `State`
//! extractor: the orchestrator plus a config snapshot for per-request
//! concerns (API-key auth, body size limit, CORS) that don't belong on
//! `Orchestrator` itself.

use std::sync::Arc;

use warden_core::config::Config;
use warden_core::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub config: Config,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, config: Config) -> Self {
        Self {
            orchestrator,
            config,
            started_at: chrono::Utc::now(),
        }
    }
}
