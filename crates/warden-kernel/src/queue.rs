//! Queue item types and the status state machine. The queue implementation
//! itself (capacity enforcement, persistence) lives in `warden-core::queue`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::AgentDefinition;

/// A small ordered priority enum; ties within a priority break FIFO by insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// The caller-supplied context an execution runs with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub message: String,
    pub document_path: Option<String>,
    pub parent_agent_path: Option<String>,
    pub extra: serde_json::Value,
}

/// Back-link recorded when a queue item was produced by a `spawn` directive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnedBy {
    pub queue_id: String,
    pub agent_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub agent_path: String,
    pub agent: AgentDefinition,
    pub context: ExecutionContext,
    pub priority: Priority,
    pub depth: u32,
    pub spawned_by: Option<SpawnedBy>,
    pub scheduled_for: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub status: QueueStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl QueueItem {
    pub fn new(
        id: impl Into<String>,
        agent: AgentDefinition,
        context: ExecutionContext,
        priority: Priority,
        depth: u32,
        spawned_by: Option<SpawnedBy>,
        scheduled_for: Option<chrono::DateTime<chrono::Utc>>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            agent_path: agent.path.clone(),
            agent,
            context,
            priority,
            depth,
            spawned_by,
            scheduled_for,
            created_at: now,
            started_at: None,
            completed_at: None,
            status: QueueStatus::Pending,
            result: None,
            error: None,
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueueError {
    #[error("queue is full (capacity {0})")]
    QueueFull(usize),

    #[error("invalid transition for item {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: String,
        from: QueueStatus,
        to: QueueStatus,
    },

    #[error("spawn depth {depth} would exceed maximum {max}")]
    DepthExceeded { depth: u32, max: u32 },

    #[error("queue item not found: {0}")]
    NotFound(String),
}
