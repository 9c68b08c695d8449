//! Permission request types. The broker (completion slots, timeout sweep)
//! lives in `warden-core::permission_broker`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Pending,
    Granted,
    Denied,
    Timeout,
}

/// A single write-class tool invocation awaiting human approval.
///
/// `id` is `<session-id>-<upstream-tool-use-id>`, the key a completion slot
/// is registered under; the LLM client surfaces the upstream tool-use id
/// per-callback, and the session id disambiguates across concurrent chats.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    pub id: String,
    pub session_id: String,
    pub upstream_tool_use_id: String,
    pub agent_path: String,
    pub tool_name: String,
    pub tool_input: serde_json::Value,
    /// The write path or shell command the tool call targets, shown to the
    /// approver alongside `tool_input`.
    pub subject: String,
    /// Glob patterns from the agent's permissions that would have allowed
    /// this automatically, for diagnostic display next to the request.
    pub allowed_patterns: Vec<String>,
    pub state: PermissionState,
    pub requested_at: chrono::DateTime<chrono::Utc>,
    pub resolved_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl PermissionRequest {
    pub fn slot_key(session_id: &str, upstream_tool_use_id: &str) -> String {
        format!("{session_id}-{upstream_tool_use_id}")
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: impl Into<String>,
        upstream_tool_use_id: impl Into<String>,
        agent_path: impl Into<String>,
        tool_name: impl Into<String>,
        tool_input: serde_json::Value,
        subject: impl Into<String>,
        allowed_patterns: Vec<String>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let session_id = session_id.into();
        let upstream_tool_use_id = upstream_tool_use_id.into();
        let id = Self::slot_key(&session_id, &upstream_tool_use_id);
        Self {
            id,
            session_id,
            upstream_tool_use_id,
            agent_path: agent_path.into(),
            tool_name: tool_name.into(),
            tool_input,
            subject: subject.into(),
            allowed_patterns,
            state: PermissionState::Pending,
            requested_at: now,
            resolved_at: None,
        }
    }
}

/// How long an unanswered request waits before the sweep marks it timed out.
pub const PERMISSION_TIMEOUT_SECS: i64 = 120;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_key_joins_session_and_tool_use_id() {
        assert_eq!(
            PermissionRequest::slot_key("sess-1", "tu-9"),
            "sess-1-tu-9"
        );
    }

    #[test]
    fn new_derives_id_from_slot_key() {
        let now = chrono::Utc::now();
        let req = PermissionRequest::new(
            "sess-1",
            "tu-9",
            "agents/a",
            "write",
            serde_json::json!({}),
            "notes/today.md",
            vec!["notes/**".to_string()],
            now,
        );
        assert_eq!(req.id, "sess-1-tu-9");
        assert_eq!(req.state, PermissionState::Pending);
    }
}
