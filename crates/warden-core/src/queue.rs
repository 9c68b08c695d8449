//! Bounded FIFO-per-priority queue with best-effort disk persistence.

use std::path::PathBuf;

use tokio::fs;
use tokio::sync::RwLock;
use tracing::warn;

use warden_kernel::queue::{QueueError, QueueItem, QueueStatus};

pub struct Queue {
    items: RwLock<Vec<QueueItem>>,
    capacity: usize,
    terminal_retention: usize,
    persistence_path: Option<PathBuf>,
}

impl Queue {
    pub fn new(capacity: usize, terminal_retention: usize, persistence_path: Option<PathBuf>) -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            capacity,
            terminal_retention,
            persistence_path,
        }
    }

    /// Load a persisted snapshot, discarding any item left in the running
    /// state (its execution did not survive the restart).
    pub async fn load(&self) -> Result<(), QueueError> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        let Ok(raw) = fs::read_to_string(path).await else {
            return Ok(());
        };
        let mut loaded: Vec<QueueItem> = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!("queue snapshot at {path:?} is corrupt, starting empty: {e}");
                return Ok(());
            }
        };
        loaded.retain(|item| item.status != QueueStatus::Running);
        *self.items.write().await = loaded;
        Ok(())
    }

    async fn persist(&self) {
        let Some(path) = &self.persistence_path else {
            return;
        };
        let snapshot = self.items.read().await;
        match serde_json::to_vec_pretty(&*snapshot) {
            Ok(bytes) => {
                if let Some(parent) = path.parent() {
                    let _ = fs::create_dir_all(parent).await;
                }
                if let Err(e) = fs::write(path, bytes).await {
                    warn!("failed to persist queue snapshot: {e}");
                }
            }
            Err(e) => warn!("failed to serialize queue snapshot: {e}"),
        }
    }

    pub async fn enqueue(&self, item: QueueItem) -> Result<String, QueueError> {
        let max_depth = item.agent.max_spawn_depth;
        if item.depth >= max_depth {
            return Err(QueueError::DepthExceeded {
                depth: item.depth,
                max: max_depth,
            });
        }
        let mut items = self.items.write().await;
        let pending_count = items
            .iter()
            .filter(|i| matches!(i.status, QueueStatus::Pending | QueueStatus::Running))
            .count();
        if pending_count >= self.capacity {
            return Err(QueueError::QueueFull(self.capacity));
        }
        let id = item.id.clone();
        items.push(item);
        drop(items);
        self.persist().await;
        Ok(id)
    }

    /// Claim the highest-priority pending item (ties broken by FIFO
    /// insertion), transitioning it to running.
    pub async fn next(&self) -> Option<QueueItem> {
        let mut items = self.items.write().await;
        let idx = items
            .iter()
            .enumerate()
            .filter(|(_, i)| i.status == QueueStatus::Pending)
            .max_by(|(ia, a), (ib, b)| {
                a.priority
                    .cmp(&b.priority)
                    .then(ib.cmp(ia)) // lower original index (earlier insert) wins ties
            })
            .map(|(idx, _)| idx)?;
        items[idx].status = QueueStatus::Running;
        items[idx].started_at = Some(chrono::Utc::now());
        let claimed = items[idx].clone();
        drop(items);
        self.persist().await;
        Some(claimed)
    }

    pub async fn has_pending(&self) -> bool {
        self.items
            .read()
            .await
            .iter()
            .any(|i| i.status == QueueStatus::Pending)
    }

    pub async fn mark_running(&self, id: &str) -> Result<(), QueueError> {
        self.transition(id, QueueStatus::Running, |item| {
            item.started_at = Some(chrono::Utc::now());
        })
        .await
    }

    pub async fn mark_completed(&self, id: &str, result: serde_json::Value) -> Result<(), QueueError> {
        self.transition(id, QueueStatus::Completed, |item| {
            item.completed_at = Some(chrono::Utc::now());
            item.result = Some(result);
        })
        .await
    }

    pub async fn mark_failed(&self, id: &str, error: String) -> Result<(), QueueError> {
        self.transition(id, QueueStatus::Failed, |item| {
            item.completed_at = Some(chrono::Utc::now());
            item.error = Some(error);
        })
        .await
    }

    async fn transition(
        &self,
        id: &str,
        to: QueueStatus,
        apply: impl FnOnce(&mut QueueItem),
    ) -> Result<(), QueueError> {
        let mut items = self.items.write().await;
        let item = items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        let valid = match (item.status, to) {
            (QueueStatus::Pending, QueueStatus::Running) => true,
            (QueueStatus::Running, QueueStatus::Completed) => true,
            (QueueStatus::Running, QueueStatus::Failed) => true,
            _ => false,
        };
        if !valid {
            return Err(QueueError::InvalidTransition {
                id: id.to_string(),
                from: item.status,
                to,
            });
        }
        item.status = to;
        apply(item);
        self.prune_terminal(&mut items);
        drop(items);
        self.persist().await;
        Ok(())
    }

    fn prune_terminal(&self, items: &mut Vec<QueueItem>) {
        let mut terminal_indices: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, i)| matches!(i.status, QueueStatus::Completed | QueueStatus::Failed))
            .map(|(idx, _)| idx)
            .collect();
        if terminal_indices.len() <= self.terminal_retention {
            return;
        }
        terminal_indices.sort_by_key(|&idx| items[idx].completed_at);
        let excess = terminal_indices.len() - self.terminal_retention;
        let mut to_remove: Vec<usize> = terminal_indices[..excess].to_vec();
        to_remove.sort_unstable_by(|a, b| b.cmp(a));
        for idx in to_remove {
            items.remove(idx);
        }
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        let items = self.items.read().await;
        QueueSnapshot {
            pending: items.iter().filter(|i| i.status == QueueStatus::Pending).cloned().collect(),
            running: items.iter().filter(|i| i.status == QueueStatus::Running).cloned().collect(),
            completed: items
                .iter()
                .filter(|i| matches!(i.status, QueueStatus::Completed | QueueStatus::Failed))
                .cloned()
                .collect(),
        }
    }

    pub async fn get(&self, id: &str) -> Option<QueueItem> {
        self.items.read().await.iter().find(|i| i.id == id).cloned()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueSnapshot {
    pub pending: Vec<QueueItem>,
    pub running: Vec<QueueItem>,
    pub completed: Vec<QueueItem>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_kernel::agent::{AgentDefinition, AgentVariant, Permissions};
    use warden_kernel::queue::ExecutionContext;

    fn test_agent(max_depth: u32) -> AgentDefinition {
        AgentDefinition {
            path: "agents/a".into(),
            name: "A".into(),
            description: String::new(),
            variant: AgentVariant::Standalone,
            model: "m".into(),
            tools: None,
            permissions: Permissions::default(),
            max_spawn_depth: max_depth,
            context_files: vec![],
            services: vec![],
            system_prompt: String::new(),
        }
    }

    fn item(id: &str, depth: u32, priority: warden_kernel::queue::Priority) -> QueueItem {
        QueueItem::new(
            id,
            test_agent(3),
            ExecutionContext::default(),
            priority,
            depth,
            None,
            None,
            chrono::Utc::now(),
        )
    }

    #[tokio::test]
    async fn enqueue_then_claim_transitions_to_running() {
        let q = Queue::new(10, 10, None);
        let id = q
            .enqueue(item("1", 0, warden_kernel::queue::Priority::Normal))
            .await
            .unwrap();
        let claimed = q.next().await.unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.status, QueueStatus::Running);
    }

    #[tokio::test]
    async fn depth_at_max_is_rejected() {
        let q = Queue::new(10, 10, None);
        let result = q.enqueue(item("1", 3, warden_kernel::queue::Priority::Normal)).await;
        assert!(matches!(result, Err(QueueError::DepthExceeded { .. })));
    }

    #[tokio::test]
    async fn capacity_enforced() {
        let q = Queue::new(1, 10, None);
        q.enqueue(item("1", 0, warden_kernel::queue::Priority::Normal))
            .await
            .unwrap();
        let second = q.enqueue(item("2", 0, warden_kernel::queue::Priority::Normal)).await;
        assert!(matches!(second, Err(QueueError::QueueFull(1))));
    }

    #[tokio::test]
    async fn higher_priority_claimed_first() {
        let q = Queue::new(10, 10, None);
        q.enqueue(item("low", 0, warden_kernel::queue::Priority::Low)).await.unwrap();
        q.enqueue(item("high", 0, warden_kernel::queue::Priority::High)).await.unwrap();
        let claimed = q.next().await.unwrap();
        assert_eq!(claimed.id, "high");
    }

    #[tokio::test]
    async fn invalid_transition_pending_to_completed_rejected() {
        let q = Queue::new(10, 10, None);
        q.enqueue(item("1", 0, warden_kernel::queue::Priority::Normal))
            .await
            .unwrap();
        let result = q.mark_completed("1", serde_json::json!({})).await;
        assert!(matches!(result, Err(QueueError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn running_never_reverts_to_pending() {
        let q = Queue::new(10, 10, None);
        q.enqueue(item("1", 0, warden_kernel::queue::Priority::Normal))
            .await
            .unwrap();
        q.next().await.unwrap();
        let result = q.mark_running("1").await;
        assert!(matches!(result, Err(QueueError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn terminal_items_pruned_beyond_retention() {
        let q = Queue::new(10, 1, None);
        for i in 0..3 {
            let id = i.to_string();
            q.enqueue(item(&id, 0, warden_kernel::queue::Priority::Normal))
                .await
                .unwrap();
            q.next().await.unwrap();
            q.mark_completed(&id, serde_json::json!({})).await.unwrap();
        }
        let snap = q.snapshot().await;
        assert_eq!(snap.completed.len(), 1);
    }
}
