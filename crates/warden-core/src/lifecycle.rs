//! Boot and graceful shutdown: wires the ten components together, spawns
//! the four background loops, and tears everything down on signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::event_bus::QueueEventBus;
use crate::orchestrator::Orchestrator;
use crate::permission_broker::PermissionBroker;
use crate::queue::Queue;
use crate::session::SessionStore;
use crate::vault::VaultStore;

const DRAIN_POLL: Duration = Duration::from_secs(5);
const TRIGGER_POLL: Duration = Duration::from_secs(60);
const TRIGGER_INITIAL_DELAY: Duration = Duration::from_secs(5);
const SESSION_CLEANUP_POLL: Duration = Duration::from_secs(3600);
const SESSION_CLEANUP_INITIAL_DELAY: Duration = Duration::from_secs(30);
const PERMISSION_CLEANUP_POLL: Duration = Duration::from_secs(120);
const PERMISSION_CLEANUP_INITIAL_DELAY: Duration = Duration::from_secs(30);
const SESSION_MAX_AGE_DAYS: i64 = 90;
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything a booted process needs: the orchestrator plus handles to the
/// loops that keep it moving. Dropping this without calling [`shutdown`]
/// leaves the loops running — callers should always shut down explicitly.
pub struct AppContext {
    pub orchestrator: Arc<Orchestrator>,
    pub config: Config,
    shutting_down: Arc<AtomicBool>,
    loops: Vec<JoinHandle<()>>,
}

/// Construct every component, replay persisted state, and start the
/// background loops.
pub async fn boot(config: Config) -> AppContext {
    let vault = VaultStore::new(config.vault_path.clone());

    let queue_path = config.vault_path.join(".warden").join("queue.json");
    let queue = Arc::new(Queue::new(
        config.queue_capacity,
        config.queue_terminal_retention,
        Some(queue_path),
    ));
    if let Err(e) = queue.load().await {
        warn!("queue snapshot failed to load: {e}");
    }

    let sessions_root = config.vault_path.join(".warden").join("sessions");
    let legacy_roots = vec![
        config.vault_path.join(".mofa").join("sessions"),
        config.vault_path.join("sessions"),
    ];
    let sessions = Arc::new(SessionStore::new(sessions_root, legacy_roots));
    if let Err(e) = sessions.boot().await {
        warn!("session index failed to build: {e}");
    }

    let permissions = Arc::new(PermissionBroker::new());
    let events = QueueEventBus::default();
    let llm = build_llm_client();

    let orchestrator = Arc::new(Orchestrator::new(
        vault,
        queue,
        sessions,
        permissions,
        events,
        llm,
        config.clone(),
    ));

    let shutting_down = Arc::new(AtomicBool::new(false));
    let loops = spawn_loops(orchestrator.clone(), shutting_down.clone());

    info!(port = config.port, vault = %config.vault_path.display(), "booted");

    AppContext {
        orchestrator,
        config,
        shutting_down,
        loops,
    }
}

fn build_llm_client() -> Arc<dyn crate::llm::LlmClient> {
    Arc::new(crate::llm::anthropic::AnthropicClient::new(
        crate::llm::anthropic::AnthropicConfig::from_env(),
    ))
}

fn spawn_loops(orchestrator: Arc<Orchestrator>, shutting_down: Arc<AtomicBool>) -> Vec<JoinHandle<()>> {
    let drain_handle = {
        let orchestrator = orchestrator.clone();
        let shutting_down = shutting_down.clone();
        tokio::spawn(async move {
            loop {
                if shutting_down.load(Ordering::Relaxed) {
                    return;
                }
                orchestrator.clone().drain_once().await;
                tokio::time::sleep(DRAIN_POLL).await;
            }
        })
    };

    let trigger_handle = {
        let orchestrator = orchestrator.clone();
        let shutting_down = shutting_down.clone();
        tokio::spawn(async move {
            tokio::time::sleep(TRIGGER_INITIAL_DELAY).await;
            loop {
                if shutting_down.load(Ordering::Relaxed) {
                    return;
                }
                orchestrator.run_trigger_pass().await;
                tokio::time::sleep(TRIGGER_POLL).await;
            }
        })
    };

    let session_cleanup_handle = {
        let orchestrator = orchestrator.clone();
        let shutting_down = shutting_down.clone();
        tokio::spawn(async move {
            tokio::time::sleep(SESSION_CLEANUP_INITIAL_DELAY).await;
            loop {
                if shutting_down.load(Ordering::Relaxed) {
                    return;
                }
                let evicted = orchestrator.sessions.evict_stale().await;
                let cleaned = orchestrator.sessions.cleanup(SESSION_MAX_AGE_DAYS).await;
                if evicted > 0 || cleaned > 0 {
                    info!(evicted, cleaned, "session cleanup pass");
                }
                tokio::time::sleep(SESSION_CLEANUP_POLL).await;
            }
        })
    };

    let permission_cleanup_handle = {
        let orchestrator = orchestrator.clone();
        let shutting_down = shutting_down.clone();
        tokio::spawn(async move {
            tokio::time::sleep(PERMISSION_CLEANUP_INITIAL_DELAY).await;
            loop {
                if shutting_down.load(Ordering::Relaxed) {
                    return;
                }
                let swept = orchestrator.permissions.sweep().await;
                if swept > 0 {
                    info!(swept, "permission sweep");
                }
                tokio::time::sleep(PERMISSION_CLEANUP_POLL).await;
            }
        })
    };

    vec![drain_handle, trigger_handle, session_cleanup_handle, permission_cleanup_handle]
}

/// Stop accepting new queued work, abort the background loops, and give
/// in-flight executions up to 30s to finish before returning.
pub async fn shutdown(ctx: AppContext) {
    ctx.shutting_down.store(true, Ordering::Relaxed);
    for handle in &ctx.loops {
        handle.abort();
    }
    for handle in ctx.loops {
        let _ = tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, handle).await;
    }
    ctx.orchestrator.drain_in_flight(SHUTDOWN_DRAIN_TIMEOUT).await;
    info!("shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn boot_then_shutdown_completes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            port: 0,
            host: "127.0.0.1".into(),
            vault_path: dir.path().to_path_buf(),
            api_key: None,
            cors_origins: vec![],
            max_message_bytes: 1024,
            max_concurrent: 1,
            queue_capacity: 10,
            queue_terminal_retention: 10,
        };
        let ctx = boot(config).await;
        assert_eq!(ctx.loops.len(), 4);
        shutdown(ctx).await;
    }
}
