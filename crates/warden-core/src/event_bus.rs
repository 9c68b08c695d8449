//! Per-queue-item event streams: created on demand, torn down 5s after a
//! terminal event so late subscribers still observe it.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use warden_kernel::bus::EventBus;

const TEARDOWN_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum QueueItemEvent {
    #[serde(rename = "connected")]
    Connected {
        #[serde(rename = "queueId")]
        queue_id: String,
        #[serde(rename = "agentPath")]
        agent_path: String,
    },
    #[serde(rename = "init")]
    Init,
    #[serde(rename = "text")]
    Text { content: String, delta: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(rename = "toolName")]
        tool_name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "done")]
    Done { result: serde_json::Value },
    #[serde(rename = "error")]
    Error { message: String },
}

impl QueueItemEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueItemEvent::Done { .. } | QueueItemEvent::Error { .. })
    }
}

#[derive(Clone)]
pub struct QueueEventBus {
    inner: Arc<EventBus<String, QueueItemEvent>>,
}

impl Default for QueueEventBus {
    fn default() -> Self {
        Self {
            inner: Arc::new(EventBus::default()),
        }
    }
}

impl QueueEventBus {
    pub async fn subscribe(&self, queue_id: &str) -> broadcast::Receiver<QueueItemEvent> {
        self.inner.subscribe(queue_id.to_string()).await
    }

    /// Publish an event; if it's terminal, schedule the channel's removal
    /// after the teardown delay so late subscribers still see it.
    pub async fn publish(&self, queue_id: &str, event: QueueItemEvent) {
        let terminal = event.is_terminal();
        self.inner.publish(&queue_id.to_string(), event).await;
        if terminal {
            let inner = self.inner.clone();
            let queue_id = queue_id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(TEARDOWN_DELAY).await;
                inner.remove(&queue_id).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let bus = QueueEventBus::default();
        let mut rx = bus.subscribe("q1").await;
        bus.publish("q1", QueueItemEvent::Init).await;
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, QueueItemEvent::Init));
    }

    #[tokio::test]
    async fn terminal_event_is_detected() {
        assert!(QueueItemEvent::Done { result: serde_json::json!({}) }.is_terminal());
        assert!(QueueItemEvent::Error { message: "x".into() }.is_terminal());
        assert!(!QueueItemEvent::Init.is_terminal());
    }
}
