//! Session identity and message types. Storage, eviction, and format parsing
//! live in `warden-core::session`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "User" => Some(Role::User),
            "Assistant" => Some(Role::Assistant),
            "System" => Some(Role::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Discriminates what a session is "about" beyond the owning agent path:
/// a client-chosen conversation id, a document a document-bound agent runs
/// against, or the sentinel used when neither applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionDiscriminator {
    Conversation(String),
    Document(String),
    Default,
}

impl SessionDiscriminator {
    pub const DEFAULT_SENTINEL: &'static str = "default";

    pub fn as_key_part(&self) -> &str {
        match self {
            SessionDiscriminator::Conversation(s) => s,
            SessionDiscriminator::Document(s) => s,
            SessionDiscriminator::Default => Self::DEFAULT_SENTINEL,
        }
    }
}

/// The (agent path, discriminator) pair that forms a session's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub agent_path: String,
    pub discriminator: SessionDiscriminator,
}

impl SessionKey {
    pub fn new(agent_path: impl Into<String>, discriminator: SessionDiscriminator) -> Self {
        Self {
            agent_path: agent_path.into(),
            discriminator,
        }
    }

    /// A stable string form suitable for use as a map key or log field.
    pub fn canonical(&self) -> String {
        format!("{}::{}", self.agent_path, self.discriminator.as_key_part())
    }
}

/// Validate a candidate upstream-session handle.
///
/// Rejects anything that isn't a non-empty string, or that looks like a
/// stringified JS object (`"[object Object]"`, or anything starting with
/// `"[object"`) — a defect class observed upstream where the LLM client
/// serialized an object instead of its session id. Invalid candidates
/// normalize to `None` on both read and write.
pub fn sanitize_upstream_handle(candidate: Option<&str>) -> Option<String> {
    let candidate = candidate?;
    if candidate.is_empty() || candidate.starts_with("[object") {
        return None;
    }
    Some(candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_rejects_empty() {
        assert_eq!(sanitize_upstream_handle(Some("")), None);
    }

    #[test]
    fn sanitize_rejects_object_object() {
        assert_eq!(sanitize_upstream_handle(Some("[object Object]")), None);
    }

    #[test]
    fn sanitize_rejects_object_prefixed() {
        assert_eq!(sanitize_upstream_handle(Some("[object Foo]")), None);
    }

    #[test]
    fn sanitize_accepts_plain_string() {
        assert_eq!(
            sanitize_upstream_handle(Some("sess_abc123")),
            Some("sess_abc123".to_string())
        );
    }

    #[test]
    fn sanitize_rejects_none() {
        assert_eq!(sanitize_upstream_handle(None), None);
    }

    #[test]
    fn session_key_canonical_uses_sentinel_for_default() {
        let key = SessionKey::new("agents/helper", SessionDiscriminator::Default);
        assert_eq!(key.canonical(), "agents/helper::default");
    }
}
