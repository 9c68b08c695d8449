//! Request/response shapes shared by the orchestrator's entry points.

use serde::Serialize;

use crate::session::ResumeInfo;

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub agent_path: String,
    pub message: String,
    pub document_path: Option<String>,
    pub session_id: Option<String>,
    pub initial_context: Option<serde_json::Value>,
    /// Spawn depth this execution runs at; 0 for a directly-requested chat,
    /// the claimed `QueueItem`'s depth for a queue-driven one.
    pub depth: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PermissionDenial {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnedChild {
    pub queue_id: String,
    pub agent_path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub response: String,
    pub spawned: Vec<SpawnedChild>,
    pub duration_ms: u64,
    pub session_id: String,
    pub message_count: usize,
    pub tool_calls: Vec<String>,
    pub permission_denials: Vec<PermissionDenial>,
    pub session_resume: ResumeInfo,
    pub debug: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatFailure {
    pub success: bool,
    pub error: String,
}

/// Events emitted on a streaming chat execution, matching the SSE envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ChatStreamEvent {
    #[serde(rename = "session")]
    Session {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "sessionResume")]
        session_resume: ResumeInfo,
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
    Done { result: Box<ChatResponse> },
    #[serde(rename = "error")]
    Error { message: String },
}
