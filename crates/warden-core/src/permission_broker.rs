//! Mediates write-class tool approval between the LLM client's callback and
//! asynchronous client decisions, via single-shot completion slots.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use tracing::info;

use warden_kernel::permission::{PermissionRequest, PermissionState, PERMISSION_TIMEOUT_SECS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Grant,
    Deny,
}

struct PendingSlot {
    request: PermissionRequest,
    completion: Option<oneshot::Sender<Decision>>,
}

pub enum PermissionEvent {
    Connected,
    Requested(PermissionRequest),
    Granted(String),
    Denied(String),
}

#[derive(Default)]
pub struct PermissionBroker {
    pending: RwLock<HashMap<String, PendingSlot>>,
    events: Arc<warden_kernel::bus::EventBus<String, String>>,
}

pub const SWEEP_STUCK_CEILING_SECS: i64 = 300;
pub const SWEEP_NON_PENDING_CEILING_SECS: i64 = 60;

impl PermissionBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending request and return a future that resolves when the
    /// request is granted, denied, or times out.
    #[allow(clippy::too_many_arguments)]
    pub async fn request(
        &self,
        session_id: &str,
        upstream_tool_use_id: &str,
        agent_path: &str,
        tool_name: &str,
        tool_input: serde_json::Value,
        subject: &str,
        allowed_patterns: Vec<String>,
    ) -> Decision {
        let now = chrono::Utc::now();
        let req = PermissionRequest::new(
            session_id,
            upstream_tool_use_id,
            agent_path,
            tool_name,
            tool_input,
            subject,
            allowed_patterns,
            now,
        );
        let id = req.id.clone();
        let (tx, rx) = oneshot::channel();

        self.pending.write().await.insert(
            id.clone(),
            PendingSlot {
                request: req.clone(),
                completion: Some(tx),
            },
        );
        self.events.publish(&"permissions".to_string(), format!("permissionRequest:{id}")).await;

        let timeout = tokio::time::Duration::from_secs(PERMISSION_TIMEOUT_SECS as u64);
        let decision = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(decision)) => decision,
            _ => Decision::Deny,
        };
        // Ensure the slot is removed even on timeout (grant/deny already
        // remove it on the resolving path).
        self.pending.write().await.remove(&id);
        decision
    }

    /// Resolve a pending request. Idempotent: a no-op (returns `false`) if
    /// the request isn't pending.
    pub async fn grant(&self, id: &str) -> bool {
        self.resolve(id, Decision::Grant).await
    }

    pub async fn deny(&self, id: &str) -> bool {
        self.resolve(id, Decision::Deny).await
    }

    async fn resolve(&self, id: &str, decision: Decision) -> bool {
        let mut pending = self.pending.write().await;
        let Some(slot) = pending.get_mut(id) else {
            return false;
        };
        let Some(tx) = slot.completion.take() else {
            return false;
        };
        slot.request.state = match decision {
            Decision::Grant => PermissionState::Granted,
            Decision::Deny => PermissionState::Denied,
        };
        slot.request.resolved_at = Some(chrono::Utc::now());
        let _ = tx.send(decision.clone());
        drop(pending);
        let event = match decision {
            Decision::Grant => format!("permissionGranted:{id}"),
            Decision::Deny => format!("permissionDenied:{id}"),
        };
        self.events.publish(&"permissions".to_string(), event).await;
        info!(request_id = id, "permission request resolved");
        true
    }

    pub async fn list_pending(&self) -> Vec<PermissionRequest> {
        self.pending
            .read()
            .await
            .values()
            .filter(|s| s.completion.is_some())
            .map(|s| s.request.clone())
            .collect()
    }

    pub async fn subscribe(&self) -> tokio::sync::broadcast::Receiver<String> {
        self.events.subscribe("permissions".to_string()).await
    }

    /// Remove requests older than the stuck ceiling, or resolved requests
    /// older than the shorter non-pending ceiling.
    pub async fn sweep(&self) -> usize {
        let now = chrono::Utc::now();
        let mut pending = self.pending.write().await;
        let before = pending.len();
        pending.retain(|_, slot| {
            let age = (now - slot.request.requested_at).num_seconds();
            if slot.completion.is_some() {
                age < SWEEP_STUCK_CEILING_SECS
            } else {
                age < SWEEP_NON_PENDING_CEILING_SECS
            }
        });
        before - pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grant_resolves_pending_request() {
        let broker = Arc::new(PermissionBroker::new());
        let broker_clone = broker.clone();
        let handle = tokio::spawn(async move {
            broker_clone
                .request(
                    "sess-1",
                    "tu-1",
                    "agents/a",
                    "write",
                    serde_json::json!({}),
                    "notes/today.md",
                    vec!["notes/**".to_string()],
                )
                .await
        });
        // Let the request register.
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        let pending = broker.list_pending().await;
        assert_eq!(pending.len(), 1);
        let id = pending[0].id.clone();
        assert!(broker.grant(&id).await);
        let decision = handle.await.unwrap();
        assert_eq!(decision, Decision::Grant);
    }

    #[tokio::test]
    async fn deny_unknown_id_is_noop() {
        let broker = PermissionBroker::new();
        assert!(!broker.deny("missing").await);
    }

    #[tokio::test]
    async fn grant_twice_second_call_is_noop() {
        let broker = Arc::new(PermissionBroker::new());
        let broker_clone = broker.clone();
        let handle = tokio::spawn(async move {
            broker_clone
                .request(
                    "sess-1",
                    "tu-1",
                    "agents/a",
                    "write",
                    serde_json::json!({}),
                    "notes/today.md",
                    vec!["notes/**".to_string()],
                )
                .await
        });
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        let id = broker.list_pending().await[0].id.clone();
        assert!(broker.grant(&id).await);
        handle.await.unwrap();
        assert!(!broker.grant(&id).await);
    }
}
