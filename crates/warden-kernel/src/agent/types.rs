use serde::{Deserialize, Serialize};

/// Which execution path an agent follows. See §4.5 of the runtime design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentVariant {
    /// Holds a multi-turn conversation keyed by a client-supplied session id.
    Chatbot,
    /// Bound to a single target document; the document body is prepended as context.
    DocumentBound,
    /// Fire-and-forget, no session bookkeeping.
    Standalone,
}

/// Glob-pattern permission sets governing what an agent may read, write, or spawn,
/// plus the tool names it is allowed to invoke.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub read: Vec<String>,
    #[serde(default)]
    pub write: Vec<String>,
    #[serde(default)]
    pub spawn: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
}

impl Permissions {
    /// `write: ["any"]` is the sentinel that exempts every write-class tool
    /// (including the shell tool) from the approval gate.
    pub fn write_is_any(&self) -> bool {
        self.write.iter().any(|p| p == "any")
    }

    pub fn matches_write(&self, vault_relative_path: &str) -> bool {
        Self::matches_any(&self.write, vault_relative_path)
    }

    pub fn matches_read(&self, vault_relative_path: &str) -> bool {
        Self::matches_any(&self.read, vault_relative_path)
    }

    pub fn matches_spawn(&self, agent_path: &str) -> bool {
        Self::matches_any(&self.spawn, agent_path)
    }

    pub fn allows_tool(&self, tool_name: &str) -> bool {
        self.tools.is_empty() || self.tools.iter().any(|t| t == tool_name)
    }

    fn matches_any(patterns: &[String], candidate: &str) -> bool {
        patterns.iter().any(|pattern| {
            globset::Glob::new(pattern)
                .map(|g| g.compile_matcher().is_match(candidate))
                .unwrap_or(false)
        })
    }
}

/// An agent definition parsed from a document at `path`. Loaded per request,
/// never cached across requests, immutable during a single execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    /// Vault-relative path; unique identity of the agent.
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub variant: AgentVariant,
    pub model: String,
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default = "default_spawn_depth")]
    pub max_spawn_depth: u32,
    #[serde(default)]
    pub context_files: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub system_prompt: String,
}

fn default_spawn_depth() -> u32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perms(write: &[&str]) -> Permissions {
        Permissions {
            write: write.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn write_glob_matches_subtree() {
        let p = perms(&["notes/*"]);
        assert!(p.matches_write("notes/todo.md"));
        assert!(!p.matches_write("projects/secret.txt"));
    }

    #[test]
    fn write_any_sentinel_detected() {
        assert!(perms(&["any"]).write_is_any());
        assert!(!perms(&["notes/*"]).write_is_any());
    }

    #[test]
    fn empty_tool_whitelist_allows_all() {
        let p = Permissions::default();
        assert!(p.allows_tool("write"));
    }

    #[test]
    fn nonempty_tool_whitelist_restricts() {
        let p = Permissions {
            tools: vec!["read".into()],
            ..Default::default()
        };
        assert!(p.allows_tool("read"));
        assert!(!p.allows_tool("shell"));
    }
}
